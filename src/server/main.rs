use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};

use entitle::config::get_config;
use entitle::errors::{LicenseError, LicenseResult};
use entitle::geo::IpLocator;
use entitle::server::{build_router, AppState, AuthState, Database};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Server failed: {e}");
        eprintln!("entitle_server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> LicenseResult<()> {
    let config = get_config()?;

    let level: Level = config
        .logging
        .level
        .parse()
        .map_err(|_| {
            LicenseError::ConfigError(format!("bad log level '{}'", config.logging.level))
        })?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;
    info!(db_type = db.db_type(), "Database ready");

    let auth = AuthState::from_config(&config.auth)?;
    if !auth.is_enabled() {
        warn!("Authentication disabled; all callers are treated as administrators");
    }

    let locator = IpLocator::from_path(config.geoip.xdb_path.as_deref())?;

    let state = AppState::new(db, auth, config.license.max_upload_bytes).with_locator(locator);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| LicenseError::ConfigError(format!("invalid bind address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| LicenseError::ServerError(format!("failed to bind {addr}: {e}")))?;
    info!("Listening on http://{addr}");

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await
        .map_err(|e| LicenseError::ServerError(format!("server error: {e}")))
}

/// Resolves once `signal` fires. If the signal cannot be installed the
/// server keeps running until killed.
async fn shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
