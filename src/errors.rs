//! Error types shared by the store, the manager and the HTTP gateway.

use thiserror::Error;

/// Errors produced by license operations.
///
/// "No license installed" is never an error; stores return `Ok(None)` and the
/// manager substitutes the default entitlement.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The submission was incomplete or malformed. Nothing was persisted.
    #[error("{0}")]
    InvalidSubmission(String),

    /// The underlying storage failed. Callers may retry; no partial state remains.
    #[error("storage error: {0}")]
    StoreError(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Any other server-side failure (socket bind, serve loop).
    #[error("server error: {0}")]
    ServerError(String),
}

impl LicenseError {
    /// Returns true if the error was caused by caller input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, LicenseError::InvalidSubmission(_))
    }
}

/// Convenience result alias.
pub type LicenseResult<T> = Result<T, LicenseError>;
