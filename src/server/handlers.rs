//! HTTP handlers for the installation license.
//!
//! - `GET /api/v1/license` - Current entitlement (any authenticated caller)
//! - `POST /api/v1/license` - Install a license (admin)
//! - `DELETE /api/v1/license` - Remove the license (admin)
//! - `GET /health` - Liveness and database connectivity

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRef, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::geo::{IpAddress, IpLocator};
use crate::license::EntitlementState;
use crate::manager::LicenseManager;
use crate::server::api_error::ApiError;
use crate::server::auth::{AdminUser, AuthState, AuthenticatedUser};
use crate::server::database::Database;
use crate::server::logging::HealthResponse;
use crate::server::upload::LicenseUpload;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub manager: LicenseManager<Database>,
    pub auth: AuthState,
    /// Resolves the caller address for audit logs
    pub locator: Arc<IpLocator>,
    /// Request body limit applied to license uploads
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(db: Arc<Database>, auth: AuthState, max_upload_bytes: usize) -> Self {
        Self {
            manager: LicenseManager::new(Arc::clone(&db)),
            db,
            auth,
            locator: Arc::new(IpLocator::disabled()),
            max_upload_bytes,
        }
    }

    pub fn with_locator(mut self, locator: IpLocator) -> Self {
        self.locator = Arc::new(locator);
        self
    }

    /// Location of the peer, when the server was started with connect info.
    fn caller_location(&self, peer: Option<ConnectInfo<SocketAddr>>) -> Option<IpAddress> {
        peer.map(|ConnectInfo(addr)| self.locator.lookup(&addr.ip().to_string()))
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Response for license removal.
#[derive(Debug, Deserialize, Serialize)]
pub struct DeleteLicenseResponse {
    pub success: bool,
}

fn log_admin_action(action: &str, subject: &str, location: Option<IpAddress>) {
    match location {
        Some(loc) => info!(
            subject = %subject,
            ip = %loc.ip,
            country = %loc.country,
            province = %loc.province,
            city = %loc.city,
            "{action}"
        ),
        None => info!(subject = %subject, "{action}"),
    }
}

/// Report the current entitlement. A missing license is not an error.
pub async fn get_license_handler(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<EntitlementState>, ApiError> {
    let entitlement = state.manager.get_entitlement().await?;
    Ok(Json(entitlement))
}

/// Install a license from a pasted code or an uploaded file.
///
/// Returns the entitlement as re-read after the write.
pub async fn upload_license_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    AdminUser(user): AdminUser,
    upload: LicenseUpload,
) -> Result<Json<EntitlementState>, ApiError> {
    let submission = upload.into_submission().map_err(|e| {
        warn!(subject = %user.subject, "Rejected license upload: {e}");
        e
    })?;

    let action = format!("Installing {} license", submission.license_type());
    log_admin_action(&action, &user.subject, state.caller_location(peer));

    let entitlement = state.manager.submit(submission).await?;
    Ok(Json(entitlement))
}

/// Remove the installed license. Succeeds when none is installed.
pub async fn delete_license_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    AdminUser(user): AdminUser,
) -> Result<Json<DeleteLicenseResponse>, ApiError> {
    log_admin_action("Removing license", &user.subject, state.caller_location(peer));
    state.manager.revoke().await?;
    Ok(Json(DeleteLicenseResponse { success: true }))
}

/// Liveness probe with database connectivity.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.db.ping().await;
    Json(HealthResponse::new(connected, state.db.db_type()))
}
