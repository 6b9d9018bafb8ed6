//! Handlers backed by upstream services.

use axum::response::Response;
use serde_json::Value;
use tracing::{info, instrument};

use super::util::require_param;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::models::CacheInvalidationRequest;
use crate::response;
use crate::state::AppState;
use crate::validation::{is_iso_date, validate_video_id};

const VIDEO_ID_MISSING: &str = "Missing query parameter videoId";
const PATHS_MISSING: &str = "paths is missing from the request body";

pub fn validate_sun(ctx: &RequestContext) -> AppResult<()> {
    let date = require_param(ctx, "date", "date query parameter is required")?;
    if !is_iso_date(date) {
        return Err(AppError::BadRequest(
            "date query parameter must be in format yyyy-MM-dd".to_string(),
        ));
    }
    Ok(())
}

/// `GET /api/sunx?date=yyyy-MM-dd`
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn sun(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let date = require_param(ctx, "date", "date query parameter is required")?;
    let times = state.upstreams.sun_times(date).await?;
    Ok(response::json(&times))
}

pub fn validate_thumbnail(ctx: &RequestContext) -> AppResult<()> {
    validate_video_id(require_param(ctx, "videoId", VIDEO_ID_MISSING)?)
}

/// `GET /api/yt-thumbnail?videoId=...`
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn thumbnail(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let video_id = require_param(ctx, "videoId", VIDEO_ID_MISSING)?;
    match state.upstreams.thumbnail(video_id).await? {
        Some(bytes) => Ok(response::jpeg(bytes)),
        None => Err(AppError::NotFound(format!(
            "no thumbnail for video {video_id}"
        ))),
    }
}

/// The `paths` list of a cache invalidation body.
fn requested_paths(ctx: &RequestContext) -> AppResult<Vec<String>> {
    let body = ctx
        .body
        .clone()
        .ok_or_else(|| AppError::BadRequest(PATHS_MISSING.to_string()))?;
    serde_json::from_value::<CacheInvalidationRequest>(body)
        .ok()
        .and_then(|req| req.paths)
        .ok_or_else(|| AppError::BadRequest(PATHS_MISSING.to_string()))
}

pub fn validate_cache(ctx: &RequestContext) -> AppResult<()> {
    requested_paths(ctx).map(|_| ())
}

/// `POST /api/cache` with `{"paths": [...]}`
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn invalidate_cache(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let paths = requested_paths(ctx)?;
    info!(count = paths.len(), "Cache invalidation requested");
    let result: Value = state.upstreams.invalidate_cdn(&paths).await?;
    Ok(response::json(&result))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn ctx(uri: &str, body: &[u8]) -> RequestContext {
        let (parts, ()) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        RequestContext::from_parts(&parts, "t".into(), body)
    }

    #[test]
    fn test_sun_date_messages() {
        let err = validate_sun(&ctx("/api/sunx", b"")).unwrap_err();
        assert_eq!(err.to_string(), "date query parameter is required");
        let err = validate_sun(&ctx("/api/sunx?date=tomorrow", b"")).unwrap_err();
        assert_eq!(err.to_string(), "date query parameter must be in format yyyy-MM-dd");
        assert!(validate_sun(&ctx("/api/sunx?date=2023-06-21", b"")).is_ok());
    }

    #[test]
    fn test_thumbnail_video_id() {
        let err = validate_thumbnail(&ctx("/api/yt-thumbnail", b"")).unwrap_err();
        assert_eq!(err.to_string(), VIDEO_ID_MISSING);
        assert!(validate_thumbnail(&ctx("/api/yt-thumbnail?videoId=../../etc", b"")).is_err());
        assert!(validate_thumbnail(&ctx("/api/yt-thumbnail?videoId=dQw4w9WgXcQ", b"")).is_ok());
    }

    #[test]
    fn test_cache_body_shapes() {
        let ok = ctx("/api/cache", br#"{"paths": ["/index.html", "/api/*"]}"#);
        assert_eq!(requested_paths(&ok).unwrap(), ["/index.html", "/api/*"]);

        let bodies: [&[u8]; 4] = [b"", br#"{}"#, br#"{"paths": "/x"}"#, b"not json"];
        for body in bodies {
            let err = validate_cache(&ctx("/api/cache", body)).unwrap_err();
            assert_eq!(err.to_string(), PATHS_MISSING);
        }
    }
}
