//! HTTP middleware for the request pipeline.
//!
//! - **Context**: request ID, body buffering, [`RequestContext`](crate::context::RequestContext) construction
//! - **Prevalidation**: host allowlist, address and user-agent denylists, red-flag bans
//! - **Authentication**: bearer token resolution into the context
//! - **Cache**: cache header resolution on the way out
//! - **Throttling**: optional per-address token bucket on `/api/*`
//!
//! # Architecture
//!
//! ```text
//! Request → Context → Throttle → Prevalidation → Auth → Cache → Router
//!              ↓          ↓            ↓                   ↓
//!        X-Request-Id  429 (api)    403 / 404       Cache-Control, Expires
//! ```

pub mod auth;
pub mod cache;
pub mod context;
pub mod ip;
pub mod prevalidation;
pub mod rate_limit;

pub use auth::authenticate;
pub use cache::resolve_cache;
pub use context::{REQUEST_ID_HEADER, RequestContextLayer};
pub use ip::{UNKNOWN_IP, extract_client_ip};
pub use prevalidation::prevalidate;
pub use rate_limit::{ApiThrottle, RateLimitError, throttle_api};
