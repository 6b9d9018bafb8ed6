use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use walk_archive::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Initialize logging, JSON lines when `LOG_FORMAT=json`.
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", false);
            error!("Configuration error: {e}");
            return Err(exitcode::CONFIG);
        }
    };
    init_logging(&config.log_level, config.log_json);

    info!("Starting Walk Archive v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.host,
        port = %config.port,
        generated_path = %config.generated_path.display(),
        public_path = %config.public_path.display(),
        privacy_zones = config.privacy_zones.len(),
        auth_enabled = config.auth_enabled(),
        "Configuration loaded"
    );
    if !config.auth_enabled() {
        warn!("No token keys configured, protected routes will refuse every caller");
    }

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let state = AppState::new(config.clone()).await.map_err(|e| {
        error!("Failed to initialize application state: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone()).map_err(|e| {
        error!("Failed to build router: {e}");
        exitcode::CONFIG
    })?;

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    for entry in state.routes.entries() {
        let access = if entry.requires_auth { "token" } else { "public" };
        info!("  /api{:<18} - {access}", entry.pattern);
    }
    info!("  GET  /authresp         - Login callback");
    info!("  GET  /health           - Health check");
    info!("  GET  /ready            - Readiness check");

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
