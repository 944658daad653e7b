use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower::ServiceBuilder;

use crate::server::handlers::{
    delete_license_handler, get_license_handler, health_handler, upload_license_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

/// Build the application router.
///
/// # Routes
///
/// - `GET /health` - Health check
/// - `GET /api/v1/license` - Current entitlement
/// - `POST /api/v1/license` - Install a license (code or file)
/// - `DELETE /api/v1/license` - Remove the license
pub fn build_router(state: AppState) -> Router {
    let license_routes = Router::new()
        .route(
            "/api/v1/license",
            get(get_license_handler)
                .post(upload_license_handler)
                .delete(delete_license_handler),
        )
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    Router::new()
        .route("/health", get(health_handler))
        .merge(license_routes)
        .layer(ServiceBuilder::new().layer(middleware::from_fn(request_logging_middleware)))
        .with_state(state)
}
