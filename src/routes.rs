//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │  Panic Recovery  │ ← 500 instead of a dropped connection
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Tracing / CORS  │ ← HTTP spans, cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Request Context  │ ← X-Request-Id, body buffering, 413 if too large
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    Throttling    │ ← 429 on /api/* if exceeded (optional)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Prevalidation   │ ← 403 / 404 with empty body
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← resolves AuthState, never rejects
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Cache Policy   │ ← Cache-Control / Expires on the way out
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/api/*` - Dispatched through the API route table
//! - `/authresp` - Login callback
//! - `/health`, `/ready` - Health & monitoring
//! - everything else - Static files from `PUBLIC_PATH`

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{any, get};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{
    ApiThrottle, RateLimitError, RequestContextLayer, authenticate, prevalidate, resolve_cache,
    throttle_api,
};
use crate::state::AppState;

/// Client-side routes that load the single-page app.
const APP_ROUTES: [&str; 2] = ["/oauth", "/routes"];

/// Build the application router with all routes and middleware configured.
///
/// # Middleware Configuration
///
/// - **Throttling**: Enabled if `rate_limit_rps > 0`
/// - **Cache Policy**: Enabled if `CACHING_ENABLED` is set
/// - **CORS**: Configured from `cors_allowed_origins`
///
/// # Errors
///
/// Returns `RateLimitError` if rate limiting configuration is invalid.
pub fn build_router(state: AppState) -> Result<Router, RateLimitError> {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);

    let index = config.public_path.join("index.html");
    let mut router = Router::new()
        .route("/api/{*rest}", any(handlers::api))
        .route("/authresp", get(handlers::auth_response))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check));
    for path in APP_ROUTES {
        router = router.route_service(path, ServeFile::new(&index));
    }
    router = router.fallback_service(
        ServeDir::new(&config.public_path).not_found_service(ServeFile::new(&index)),
    );

    // Innermost first: each layer wraps everything added before it
    router = router
        .layer(from_fn_with_state(state.clone(), resolve_cache))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn_with_state(state.clone(), prevalidate));

    if config.rate_limiting_enabled() {
        info!(
            rps = config.rate_limit_rps,
            burst = config.rate_limit_burst,
            "API throttling enabled"
        );
        let throttle = ApiThrottle::new(config.rate_limit_rps, config.rate_limit_burst)?;
        router = router.layer(from_fn_with_state(throttle, throttle_api));
    } else {
        info!("API throttling disabled (RATE_LIMIT_RPS=0)");
    }

    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );
    router = router.layer(RequestContextLayer::new(config.max_request_body_size));

    if state.cache_policy.is_enabled() {
        info!("Cache headers enabled");
    }

    router = router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    Ok(router.with_state(state))
}

/// Build CORS layer from configuration.
///
/// `["*"]` allows any origin; otherwise only the listed origins that parse
/// as header values are allowed.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn router(dir: &std::path::Path) -> Router {
        router_with(dir, Config::default()).await
    }

    async fn router_with(dir: &std::path::Path, config: Config) -> Router {
        let public = dir.join("public");
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(public.join("index.html"), "<html>walks</html>").unwrap();
        std::fs::write(public.join("app.js"), "console.log(1)").unwrap();
        let state = AppState::new(Config {
            generated_path: dir.join("generated"),
            public_path: public,
            ban_list_path: dir.join("bans.txt"),
            ..config
        })
        .await
        .unwrap();
        build_router(state).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_build_cors_layer_any() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn test_build_cors_layer_specific() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_static_files_and_app_routes() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path()).await;

        let js = app
            .clone()
            .oneshot(Request::get("/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(js.status(), StatusCode::OK);
        assert_eq!(body_text(js).await, "console.log(1)");

        for path in ["/", "/oauth", "/routes"] {
            let page = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(page.status(), StatusCode::OK, "{path}");
            assert_eq!(body_text(page).await, "<html>walks</html>");
        }
    }

    #[tokio::test]
    async fn test_every_response_carries_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path()).await;

        let response = app
            .oneshot(
                Request::get("/api/nothingHere")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn test_throttled_api_keeps_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            rate_limit_rps: 1,
            rate_limit_burst: 1,
            ..Config::default()
        };
        let app = router_with(dir.path(), config).await;
        let request = |id: &str| {
            Request::get("/api/nothingHere")
                .header("x-request-id", id)
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request("r-1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::NOT_FOUND);

        let second = app.clone().oneshot(request("r-2")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["x-request-id"], "r-2");

        let page = app
            .oneshot(Request::get("/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(page.status(), StatusCode::OK);
    }
}
