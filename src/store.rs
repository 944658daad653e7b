//! License storage abstraction.
//!
//! A store holds zero or one [`LicenseRecord`]. The only way to create a record
//! is [`LicenseStore::replace`], which deletes whatever exists and inserts the new
//! record as one atomic unit.
//!
//! Implementations:
//! - [`MemoryStore`]: in-process, used by tests and embedders
//! - `server::database::Database`: SQLite/Postgres (requires the `server` feature)

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::errors::LicenseResult;
use crate::license::{LicenseRecord, NewLicense};

/// Persistence for the installation license.
pub trait LicenseStore: Send + Sync {
    /// Fetch the most recent record.
    ///
    /// Returns:
    /// - `Ok(Some(record))` if a license is installed
    /// - `Ok(None)` if none is installed
    /// - `Err(LicenseError::StoreError)` on storage failure
    fn get_current(&self) -> impl Future<Output = LicenseResult<Option<LicenseRecord>>> + Send;

    /// Atomically delete every existing record and insert `license`.
    ///
    /// On failure nothing changes.
    fn replace(&self, license: NewLicense) -> impl Future<Output = LicenseResult<()>> + Send;

    /// Delete the current record. Succeeds when nothing is installed.
    fn delete_current(&self) -> impl Future<Output = LicenseResult<()>> + Send;
}

/// In-memory store.
///
/// The write lock is the transaction boundary: readers see either the state
/// before a replace or the state after it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: RwLock<Option<LicenseRecord>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LicenseStore for MemoryStore {
    async fn get_current(&self) -> LicenseResult<Option<LicenseRecord>> {
        Ok(self.current.read().await.clone())
    }

    async fn replace(&self, license: NewLicense) -> LicenseResult<()> {
        let mut current = self.current.write().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        *current = Some(LicenseRecord {
            id,
            license_type: license.license_type,
            code: license.code,
            data: license.data,
            created_at: Utc::now().naive_utc(),
        });
        Ok(())
    }

    async fn delete_current(&self) -> LicenseResult<()> {
        self.current.write().await.take();
        Ok(())
    }
}
