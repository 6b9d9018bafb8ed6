//! Per-address throttling of `/api/*` requests.
//!
//! Static assets, the login callback and health checks are never throttled;
//! only the archive API is. Buckets are keyed by the client address the
//! request context resolved, so the gate and the throttle agree on who is
//! calling. Configured with `RATE_LIMIT_RPS` (0 disables) and
//! `RATE_LIMIT_BURST`.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tracing::warn;

use super::ip::extract_client_ip;
use crate::context::RequestContext;
use crate::metrics;

const THROTTLED_PREFIX: &str = "/api/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("RATE_LIMIT_RPS must be greater than 0 when throttling is enabled")]
    ZeroRps,
}

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Shared token buckets for API callers.
#[derive(Clone)]
pub struct ApiThrottle {
    limiter: Arc<KeyedLimiter>,
    rps: u32,
}

impl ApiThrottle {
    /// # Errors
    ///
    /// Returns `RateLimitError::ZeroRps` if `rps` is 0.
    pub fn new(rps: u32, burst: u32) -> Result<Self, RateLimitError> {
        let per_second = NonZeroU32::new(rps).ok_or(RateLimitError::ZeroRps)?;
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Ok(Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            rps,
        })
    }

    /// Take a token for `client_ip`, or the whole seconds until one frees up.
    fn admit(&self, client_ip: &str) -> Result<(), u64> {
        self.limiter.check_key(&client_ip.to_string()).map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }
}

/// Answer `429` once a client has used up its API budget.
pub async fn throttle_api(
    State(throttle): State<ApiThrottle>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with(THROTTLED_PREFIX) {
        return next.run(request).await;
    }

    let client_ip = match request.extensions().get::<RequestContext>() {
        Some(ctx) => ctx.client_ip.clone(),
        None => extract_client_ip(request.headers()).into_owned(),
    };

    match throttle.admit(&client_ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(
                client_ip = %client_ip,
                path = %request.uri().path(),
                retry_after_secs = retry_after,
                "API budget exhausted"
            );
            metrics::record_throttled();
            (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    (header::RETRY_AFTER, retry_after.to_string()),
                    (header::HeaderName::from_static("x-ratelimit-limit"), throttle.rps.to_string()),
                ],
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app(rps: u32, burst: u32) -> Router {
        Router::new()
            .route("/api/globalStats", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(from_fn_with_state(ApiThrottle::new(rps, burst).unwrap(), throttle_api))
    }

    fn request(path: &str, ip: &str) -> Request<Body> {
        Request::get(path)
            .header("cf-connecting-ip", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_zero_rps_rejected() {
        assert_eq!(ApiThrottle::new(0, 50).err(), Some(RateLimitError::ZeroRps));
        assert!(ApiThrottle::new(5, 0).is_ok());
    }

    #[tokio::test]
    async fn test_budget_is_per_address() {
        let app = app(1, 1);

        let first = app.clone().oneshot(request("/api/globalStats", "203.0.113.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.clone().oneshot(request("/api/globalStats", "203.0.113.1")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["x-ratelimit-limit"], "1");
        assert!(second.headers().contains_key(header::RETRY_AFTER));

        let other = app.oneshot(request("/api/globalStats", "203.0.113.2")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_only_api_paths_spend_budget() {
        let app = app(1, 1);
        for _ in 0..3 {
            let health = app.clone().oneshot(request("/health", "203.0.113.9")).await.unwrap();
            assert_eq!(health.status(), StatusCode::OK);
        }
        let api = app.oneshot(request("/api/globalStats", "203.0.113.9")).await.unwrap();
        assert_eq!(api.status(), StatusCode::OK);
    }
}
