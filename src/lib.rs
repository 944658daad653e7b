//! Entitle - installation-wide license entitlement service
//!
//! One license (a pasted code or an uploaded file) is active per installation.
//! Installing a license replaces the previous one atomically; reading the
//! entitlement without a license returns a default state instead of an error.
//!
//! # Features
//!
//! - `server` - HTTP gateway, SQL store and JWT auth. Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use entitle::license::Submission;
//! use entitle::manager::LicenseManager;
//! use entitle::store::MemoryStore;
//!
//! # #[tokio::main]
//! # async fn main() -> entitle::errors::LicenseResult<()> {
//! let manager = LicenseManager::new(Arc::new(MemoryStore::new()));
//! let state = manager.submit(Submission::code("ABC-123")?).await?;
//! assert_eq!(state.code, "ABC-123");
//! # Ok(())
//! # }
//! ```

// Core modules (always available)
pub mod config;
pub mod errors;
pub mod geo;
pub mod license;
pub mod manager;
pub mod store;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
