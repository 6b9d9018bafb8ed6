//! Login callback: exchanges the provider's identity token for an access
//! token cookie.

use axum::Extension;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::header::SET_COOKIE;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::auth::{ACCESS_TOKEN_TTL_SECS, Claims, Rejection, mint_access_token};
use crate::context::{ACCESS_TOKEN_COOKIE, ID_TOKEN_COOKIE, RequestContext};
use crate::error::{AppError, AppResult};
use crate::response;
use crate::state::AppState;
use crate::utils::http_date;

/// Cookie telling the client when to send the user through login again.
pub const VALID_UNTIL_COOKIE: &str = "access_token_valid_until";

/// `GET /authresp`
#[instrument(skip_all, fields(request_id = %ctx.request_id))]
pub async fn auth_response(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> AppResult<Response> {
    let id_token = ctx
        .cookies
        .get(ID_TOKEN_COOKIE)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{ID_TOKEN_COOKIE} cookie is missing")))?;

    let origin = state
        .config
        .public_host
        .as_deref()
        .ok_or_else(|| AppError::ConfigError("PUBLIC_HOST must be set".to_string()))?;
    let secret = state
        .config
        .access_token_secret
        .as_deref()
        .ok_or_else(|| AppError::ConfigError("ACCESS_TOKEN_SECRET must be set".to_string()))?;

    let now = Utc::now();
    let identity = match state.authenticator.verify_identity(id_token, now.timestamp()) {
        Ok(claims) => claims,
        Err(Rejection::NoKeyForAlgorithm) => {
            return Err(AppError::ConfigError("AUTH_PUBLIC_KEY must be set".to_string()));
        }
        Err(reason) => {
            warn!(%reason, client_ip = %ctx.client_ip, "Identity token rejected");
            return Err(AppError::Unauthorized);
        }
    };

    let expires = now + Duration::seconds(ACCESS_TOKEN_TTL_SECS);
    let claims = Claims {
        sub: identity.sub,
        scope: vec![state.config.required_scope.clone()],
        exp: expires.timestamp(),
        iss: Some(format!("https://{origin}")),
        aud: identity.aud,
    };
    let access_token = mint_access_token(secret, &claims)?;
    info!(subject = %claims.sub, expires_at = claims.exp, "Access token issued");

    let mut response = response::found(&format!("https://{origin}"))?;
    for cookie in login_cookies(origin, &access_token, now, expires) {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::Internal(format!("invalid cookie value: {e}")))?;
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(response)
}

/// Access token, its expiry marker, and a cleared identity token.
fn login_cookies(
    origin: &str,
    access_token: &str,
    now: DateTime<Utc>,
    expires: DateTime<Utc>,
) -> [String; 3] {
    let expires_at = http_date(expires);
    [
        format!("{ACCESS_TOKEN_COOKIE}={access_token}; Domain={origin}; HttpOnly; Expires={expires_at}"),
        format!(
            "{VALID_UNTIL_COOKIE}={}; Domain={origin}; Expires={expires_at}",
            expires.timestamp_millis()
        ),
        format!("{ID_TOKEN_COOKIE}=; Domain={origin}; HttpOnly; Expires={}", http_date(now)),
    ]
}
