// src/server/mod.rs

//! HTTP gateway for the installation license.
//!
//! - `database`   → `LicenseStore` over SQLite/Postgres
//! - `handlers`   → Axum handlers and shared `AppState`
//! - `routes`     → Router builder
//! - `auth`       → JWT authentication and role extractors
//! - `upload`     → Multipart/JSON/form upload extractor
//! - `api_error`  → Standard error body and status mapping
//! - `logging`    → Request logging middleware and health body

pub mod api_error;
pub mod auth;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod upload;

pub use api_error::{ApiError, ErrorCode};
pub use auth::{AdminUser, AuthError, AuthState, AuthenticatedUser, Claims, JwtValidator, Role};
pub use database::Database;
pub use handlers::{
    delete_license_handler, get_license_handler, health_handler, upload_license_handler,
    AppState, DeleteLicenseResponse,
};
pub use routes::build_router;
pub use upload::{LicenseUpload, UploadLicenseRequest};
