//! Cache header middleware: applies the [`CachePolicy`](crate::cache_policy::CachePolicy)
//! to every finished response.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::context::{AuthState, RequestContext};
use crate::state::AppState;

pub async fn resolve_cache(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.cache_policy.is_enabled() {
        return next.run(request).await;
    }

    let auth = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.auth.clone())
        .unwrap_or(AuthState::Unauthenticated);
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    let status = response.status();
    state
        .cache_policy
        .resolve(&auth, status, response.headers_mut(), &path, Utc::now());
    response
}
