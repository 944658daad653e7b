//! Standardized API error responses.
//!
//! All error responses follow this JSON structure:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "MISSING_FIELD",
//!     "message": "missing license input",
//!     "details": null
//!   }
//! }
//! ```
//!
//! The `details` field is optional and omitted when empty.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::LicenseError;
use crate::license::MISSING_INPUT;
use crate::server::auth::AuthError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// Neither a license code nor a license file was supplied
    MissingField,
    /// Upload exceeds the configured size limit (413)
    PayloadTooLarge,

    // === Authentication Errors (400/401/403) ===
    /// No authentication token provided
    MissingToken,
    /// Authorization header is malformed
    InvalidHeader,
    /// Authentication token is invalid
    InvalidToken,
    /// Authentication token has expired
    TokenExpired,
    /// Caller lacks the required role
    InsufficientRole,

    // === Server Errors (5xx) ===
    /// Database operation failed
    DatabaseError,
    /// Server configuration error
    ConfigError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::MissingField | ErrorCode::InvalidHeader => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::MissingToken | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::InsufficientRole => StatusCode::FORBIDDEN,

            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ErrorCode::DatabaseError | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::MissingField => MISSING_INPUT,
            ErrorCode::PayloadTooLarge => "License upload is too large",
            ErrorCode::MissingToken => "Authentication token is required",
            ErrorCode::InvalidHeader => "Authorization header is malformed",
            ErrorCode::InvalidToken => "Authentication token is invalid",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::InsufficientRole => "Insufficient permissions for this operation",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    /// Adds details to an existing error.
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    /// Request payload could not be read.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, reason)
    }

    /// Map an axum extractor rejection, keeping the size-limit case distinct.
    pub fn from_rejection(status: StatusCode, reason: impl Into<String>) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(ErrorCode::PayloadTooLarge)
        } else {
            Self::invalid_request(reason)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error.code, self.error.message)
    }
}

impl std::error::Error for ApiError {}

// === Conversions from domain error types ===

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::InvalidSubmission(msg) if msg == MISSING_INPUT => ApiError::with_message(
                ErrorCode::MissingField,
                msg,
            )
            .details(serde_json::json!({ "fields": ["license_code", "license_file"] })),
            LicenseError::InvalidSubmission(msg) => {
                ApiError::with_message(ErrorCode::InvalidRequest, msg)
            }
            // Storage details stay in the server log.
            LicenseError::StoreError(_) => ApiError::new(ErrorCode::DatabaseError),
            LicenseError::ConfigError(msg) => ApiError::with_message(ErrorCode::ConfigError, msg),
            LicenseError::ServerError(_) => ApiError::new(ErrorCode::InternalError),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::MissingToken => ErrorCode::MissingToken,
            AuthError::InvalidHeader => ErrorCode::InvalidHeader,
            AuthError::InvalidToken(_) => ErrorCode::InvalidToken,
            AuthError::TokenExpired => ErrorCode::TokenExpired,
            AuthError::InsufficientRole(_) => ErrorCode::InsufficientRole,
        };
        ApiError::with_message(code, err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl IntoResponse for LicenseError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::Role;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::MissingToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InsufficientRole.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_input_maps_to_missing_field() {
        let err: ApiError = LicenseError::InvalidSubmission(MISSING_INPUT.to_string()).into();
        assert_eq!(err.error.code, ErrorCode::MissingField);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("MISSING_FIELD"));
        assert!(json.contains("license_file"));
    }

    #[test]
    fn oversized_rejection_maps_to_413() {
        let err = ApiError::from_rejection(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded");
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = ApiError::from_rejection(StatusCode::BAD_REQUEST, "bad boundary");
        assert_eq!(err.error.code, ErrorCode::InvalidRequest);
        assert_eq!(err.error.message, "bad boundary");
    }

    #[test]
    fn store_error_hides_details() {
        let err: ApiError = LicenseError::StoreError("no such table: licenses".into()).into();
        assert_eq!(err.error.code, ErrorCode::DatabaseError);
        assert!(!err.error.message.contains("licenses"));
    }

    #[test]
    fn auth_error_conversion() {
        let err: ApiError = AuthError::InsufficientRole(Role::Admin).into();
        assert_eq!(err.error.code, ErrorCode::InsufficientRole);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
