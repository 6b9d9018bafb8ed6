//! Shared application state for Axum handlers.
//!
//! Everything here is built once at startup and is read-only afterwards,
//! except the ban list (owned by the gate) and the archive readability flag
//! maintained by a background task.
//!
//! # Structured Concurrency
//!
//! Background work (the archive check and ban list appends) is tracked by a
//! `tokio_util::task::TaskTracker` and stopped through a `CancellationToken`.
//! Call `shutdown()` before exit so pending ban list writes reach the disk.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::auth::TokenAuthenticator;
use crate::cache_policy::CachePolicy;
use crate::config::Config;
use crate::dispatch::RouteTable;
use crate::error::AppResult;
use crate::gate::{BanList, PrevalidationGate};
use crate::geo::PrivacyZones;
use crate::store::ArchiveStore;
use crate::upstream::Upstreams;

/// How often the archive root is probed for readability.
const ARCHIVE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application state, cloned into every handler.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config).await?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: ArchiveStore,
    pub zones: Arc<PrivacyZones>,
    pub authenticator: TokenAuthenticator,
    pub gate: PrevalidationGate,
    pub cache_policy: CachePolicy,
    pub upstreams: Upstreams,
    pub routes: Arc<RouteTable>,
    /// Timestamp when the application started
    pub started_at: Instant,
    archive_readable: Arc<AtomicBool>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build every component from configuration and start background tasks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` for unusable keys or a duplicated
    /// route, and `AppError::Io` if the ban list exists but cannot be read.
    pub async fn new(config: Config) -> AppResult<Self> {
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();

        let bans = Arc::new(BanList::load(&config.ban_list_path).await?);
        let gate = PrevalidationGate::new(&config, bans, task_tracker.clone());
        let authenticator = TokenAuthenticator::from_config(&config)?;
        let upstreams = Upstreams::from_config(&config)?;
        let routes = Arc::new(RouteTable::api()?);
        let store = ArchiveStore::new(config.generated_path.clone());
        let archive_readable = Arc::new(AtomicBool::new(
            archive_is_readable(store.root()).await,
        ));

        if config.privacy_zones.is_empty() {
            warn!("PRIVACY_ZONES is empty; unauthenticated coordinate requests will fail");
        }

        let state = Self {
            zones: Arc::new(config.privacy_zones.clone()),
            cache_policy: CachePolicy::from_config(&config),
            config: Arc::new(config),
            store,
            authenticator,
            gate,
            upstreams,
            routes,
            started_at: Instant::now(),
            archive_readable,
            task_tracker,
            cancellation_token,
        };

        state.spawn_archive_check_task();
        Ok(state)
    }

    /// Whether the archive root was readable at the last probe.
    pub fn archive_readable(&self) -> bool {
        self.archive_readable.load(Ordering::Relaxed)
    }

    /// Tracker for background work that must finish before exit.
    pub fn tasks(&self) -> &TaskTracker {
        &self.task_tracker
    }

    /// Periodically probe the archive root and log transitions.
    fn spawn_archive_check_task(&self) {
        let root = self.store.root().to_path_buf();
        let readable = Arc::clone(&self.archive_readable);
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(ARCHIVE_CHECK_INTERVAL);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Archive check task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let now_readable = archive_is_readable(&root).await;
                        let was_readable = readable.swap(now_readable, Ordering::Relaxed);
                        match (was_readable, now_readable) {
                            (true, false) => warn!(path = %root.display(), "Archive root is no longer readable"),
                            (false, true) => info!(path = %root.display(), "Archive root is readable again"),
                            _ => trace!(readable = now_readable, "Archive check"),
                        }
                    }
                }
            }

            debug!("Archive check task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// Cancels the periodic tasks, closes the tracker and waits for pending
    /// ban list appends to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

async fn archive_is_readable(root: &Path) -> bool {
    tokio::fs::read_dir(root).await.is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_state_reports_archive() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Config {
            generated_path: dir.path().to_path_buf(),
            ban_list_path: dir.path().join("bans.txt"),
            ..Config::default()
        })
        .await
        .unwrap();
        assert!(state.archive_readable());
        assert!(state.gate.bans().is_empty().await);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_archive_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Config {
            generated_path: dir.path().join("absent"),
            ban_list_path: dir.path().join("bans.txt"),
            ..Config::default()
        })
        .await
        .unwrap();
        assert!(!state.archive_readable());
        state.shutdown().await;
    }
}
