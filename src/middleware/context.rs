//! Request context middleware.
//!
//! # Features
//!
//! - Generates UUIDv4 request IDs for incoming requests without one
//! - Propagates existing `X-Request-Id` headers and echoes them on responses
//! - Buffers the body (up to the configured limit) and builds the
//!   [`RequestContext`] every later stage reads from the request extensions
//! - Logs one completion line per request with secrets masked
//!
//! # Client Usage
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:3000/api/globalStats
//! ```

use std::task::{Context, Poll};

use axum::body::{Body, to_bytes};
use axum::http::header::HeaderValue;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{Span, debug, info, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::metrics;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Fallback header value when request ID parsing fails.
static UNKNOWN_REQUEST_ID: HeaderValue = HeaderValue::from_static("unknown");

/// Builds the [`RequestContext`] for each request.
#[derive(Clone)]
pub struct RequestContextLayer {
    max_body_size: usize,
}

impl RequestContextLayer {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService {
            inner,
            max_body_size: self.max_body_size,
        }
    }
}

/// Request context service wrapper.
#[derive(Clone)]
pub struct RequestContextService<S> {
    inner: S,
    max_body_size: usize,
}

impl<S> Service<Request<Body>> for RequestContextService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let request_id = extract_or_generate_request_id(&req);
        Span::current().record("request_id", &request_id);

        let max_body_size = self.max_body_size;
        // Take the service that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let bytes = match to_bytes(body, max_body_size).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Request body rejected");
                    let mut response = StatusCode::PAYLOAD_TOO_LARGE.into_response();
                    stamp_request_id(&mut response, &request_id);
                    return Ok(response);
                }
            };

            let ctx = RequestContext::from_parts(&parts, request_id.clone(), &bytes);
            debug!(
                request_id = %request_id,
                method = %ctx.method,
                path = %ctx.path,
                client_ip = %ctx.client_ip,
                "Processing request"
            );

            if let Ok(value) = request_id.parse() {
                parts.headers.insert(REQUEST_ID_HEADER, value);
            }
            let method = ctx.method.clone();
            let path = ctx.path.clone();
            let started = ctx.started;
            let query = format!("{:?}", ctx.redacted_query());
            let cookies = format!("{:?}", ctx.redacted_cookies());
            parts.extensions.insert(ctx);

            let mut response = inner.call(Request::from_parts(parts, Body::from(bytes))).await?;
            stamp_request_id(&mut response, &request_id);

            let elapsed = started.elapsed();
            let status = response.status();
            metrics::record_request_duration(
                metrics_route(&path),
                method.as_str(),
                status.as_str(),
                elapsed.as_secs_f64(),
            );
            info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                query = %query,
                cookies = %cookies,
                status = status.as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Request completed"
            );

            Ok(response)
        })
    }
}

fn stamp_request_id(response: &mut Response<Body>, request_id: &str) {
    response.headers_mut().insert(
        REQUEST_ID_HEADER,
        request_id
            .parse()
            .unwrap_or_else(|_| UNKNOWN_REQUEST_ID.clone()),
    );
}

/// Route label with bounded cardinality: API paths as-is, everything else `static`.
fn metrics_route(path: &str) -> &str {
    if path.starts_with("/api/") || matches!(path, "/health" | "/ready" | "/authresp") {
        path
    } else {
        "static"
    }
}

/// Extract request ID from headers or generate a new one.
fn extract_or_generate_request_id<B>(req: &Request<B>) -> String {
    if let Some(header_value) = req.headers().get(REQUEST_ID_HEADER)
        && let Ok(value) = header_value.to_str()
        && !value.is_empty()
    {
        return value.to_string();
    }

    Uuid::new_v4().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::Extension;
    use axum::Router;
    use axum::routing::post;
    use tower::ServiceExt;

    async fn echo(Extension(ctx): Extension<RequestContext>) -> String {
        format!("{}|{}", ctx.path, ctx.body.map(|b| b.to_string()).unwrap_or_default())
    }

    fn app(limit: usize) -> Router {
        Router::new()
            .route("/api/cache", post(echo))
            .layer(RequestContextLayer::new(limit))
    }

    #[test]
    fn test_extract_existing_request_id() {
        let req = Request::builder()
            .header("x-request-id", "existing-id-123")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_or_generate_request_id(&req), "existing-id-123");
    }

    #[test]
    fn test_generate_new_request_id() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = extract_or_generate_request_id(&req);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_metrics_route_cardinality() {
        assert_eq!(metrics_route("/api/events"), "/api/events");
        assert_eq!(metrics_route("/health"), "/health");
        assert_eq!(metrics_route("/assets/app.3f2a.js"), "static");
    }

    #[tokio::test]
    async fn test_context_available_to_handler() {
        let response = app(1024)
            .oneshot(
                Request::post("/api/cache")
                    .header("x-request-id", "abc")
                    .body(Body::from(r#"{"paths":["/"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"/api/cache|{"paths":["/"]}"#);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let response = app(4)
            .oneshot(
                Request::post("/api/cache")
                    .body(Body::from("0123456789"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
