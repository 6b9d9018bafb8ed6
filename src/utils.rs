use chrono::{DateTime, Utc};
use tokio::signal;
use tracing::{error, warn};

/// Format as an RFC 7231 HTTP-date, e.g. `Sun, 18 Oct 2026 12:00:00 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// HTTP-date for an epoch-seconds instant, falling back to the epoch itself.
pub fn http_date_from_secs(epoch_secs: i64) -> String {
    http_date(DateTime::from_timestamp(epoch_secs, 0).unwrap_or_default())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is a critical
/// initialization failure that should halt the application.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                panic!("Critical: cannot install Ctrl+C signal handler");
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                panic!("Critical: cannot install SIGTERM signal handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
