//! Bearer token authentication middleware.
//!
//! Resolves the caller's [`AuthState`](crate::context::AuthState) once per
//! request and stores the updated context back into the extensions. It
//! never rejects: routes that need an authenticated caller are refused by
//! the dispatcher, so a bad token and no token look the same to a client.
//!
//! # Credential Sources
//!
//! In order of precedence:
//!
//! ```bash
//! curl -H "Authorization: Bearer $TOKEN" http://localhost:3000/api/events
//! curl --cookie "access_token=$TOKEN" http://localhost:3000/api/events
//! curl "http://localhost:3000/api/events?jwt=$TOKEN"
//! ```

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::trace;

use crate::context::RequestContext;
use crate::state::AppState;

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let resolved = request.extensions().get::<RequestContext>().and_then(|ctx| {
        let token = ctx.credential()?;
        Some(ctx.with_auth(state.authenticator.authenticate(token)))
    });

    match resolved {
        Some(ctx) => {
            request.extensions_mut().insert(ctx);
        }
        None => trace!("No credential presented"),
    }

    next.run(request).await
}
