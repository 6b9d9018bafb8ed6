//! # Walk Archive
//!
//! HTTP service in front of a personal geodata archive: dated walk routes,
//! geotagged events and licence plate sightings, served as JSON, CSV and
//! GeoJSON, featuring:
//!
//! - **Privacy**: points inside configured privacy zones are removed for
//!   anonymous callers, before proximity searches and on every route
//! - **Security**: bearer token authentication, host and address gating,
//!   red-flag auto-banning, optional rate limiting
//! - **Caching**: cache headers resolved per caller and per path
//! - **Observability**: request IDs, structured logging, Prometheus metrics,
//!   health endpoints
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Context → Gate → Auth → Cache)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Dispatcher (route table: auth check → validate → process)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (routes, events, plates, archive, external)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Geo (zones, proximity)  │  ArchiveStore  │  Upstreams      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use walk_archive::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config).await?;
//!     let app = build_router(state)?;
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! GENERATED_PATH=./generated PUBLIC_PATH=./public \
//! PRIVACY_ZONES='[{"coords":{"latitude":51.5,"longitude":-0.12},"radius":400}]' \
//! ACCESS_TOKEN_SECRET=change-me cargo run
//! ```

pub mod auth;
pub mod cache_policy;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod geo;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
pub mod upstream;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use context::{AuthState, RequestContext};
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
