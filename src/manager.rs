//! License manager: turns store state into entitlements and persists submissions.

use std::sync::Arc;

use tracing::{info, info_span};

use crate::errors::LicenseResult;
use crate::license::{EntitlementState, Submission};
use crate::store::LicenseStore;

/// Domain logic over a [`LicenseStore`].
#[derive(Debug)]
pub struct LicenseManager<S> {
    store: Arc<S>,
}

impl<S> Clone for LicenseManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LicenseStore> LicenseManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current entitlement.
    ///
    /// Falls back to the default entitlement when no license is installed;
    /// only a storage failure is an error.
    pub async fn get_entitlement(&self) -> LicenseResult<EntitlementState> {
        let state = match self.store.get_current().await? {
            Some(record) => EntitlementState::from(&record),
            None => EntitlementState::default(),
        };
        Ok(state)
    }

    /// Install a new license, replacing any existing one.
    ///
    /// Returns the entitlement re-read from the store after the write.
    pub async fn submit(&self, submission: Submission) -> LicenseResult<EntitlementState> {
        let license = submission.into_new_license();
        let license_type = license.license_type;
        let size = license.data.len();

        self.store.replace(license).await?;

        let span = info_span!("license_event", event = "submitted", license_type = %license_type);
        span.in_scope(|| info!(bytes = size, "License installed"));

        self.get_entitlement().await
    }

    /// Remove the installed license, if any.
    pub async fn revoke(&self) -> LicenseResult<()> {
        self.store.delete_current().await?;

        let span = info_span!("license_event", event = "revoked");
        span.in_scope(|| info!("License removed"));

        Ok(())
    }
}
