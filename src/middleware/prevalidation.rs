//! Prevalidation middleware: runs the gate before anything else looks at
//! the request.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::context::RequestContext;
use crate::error::AppError;
use crate::state::AppState;

/// Reject requests the gate refuses, with an empty body.
pub async fn prevalidate(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(ctx) = request.extensions().get::<RequestContext>() else {
        warn!("Request context missing, prevalidation layer is misordered");
        return AppError::Internal("request context missing".to_string()).into_response();
    };

    if let Err(rejection) = state.gate.prevalidate(ctx).await {
        return AppError::from(rejection).into_response();
    }

    next.run(request).await
}
