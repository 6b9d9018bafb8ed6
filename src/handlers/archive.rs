//! Passthrough reads of precomputed archive files.

use axum::response::Response;
use serde_json::Value;
use tracing::instrument;

use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::response::{self, CSV};
use crate::state::AppState;
use crate::validation::is_month;

const GLOBAL_STATS: &str = "globalStats/globalStats.json";
const YOUTUBE_IDS: &str = "youtubeIds/youtubeIds.json";

/// `GET /api/globalStats`
#[instrument(skip_all)]
pub async fn global_stats(state: &AppState, _ctx: &RequestContext) -> AppResult<Response> {
    let stats: Value = state.store.require_json(GLOBAL_STATS).await?;
    Ok(response::json(&stats))
}

/// `GET /api/youtubeIds`
#[instrument(skip_all)]
pub async fn youtube_ids(state: &AppState, _ctx: &RequestContext) -> AppResult<Response> {
    let ids: Value = state.store.require_json(YOUTUBE_IDS).await?;
    Ok(response::json(&ids))
}

pub fn validate_walks(ctx: &RequestContext) -> AppResult<()> {
    match ctx.param("q") {
        Some(month) if is_month(month) => Ok(()),
        _ => Err(AppError::BadRequest(
            "q must be provided and in yyyy-MM format".to_string(),
        )),
    }
}

/// `GET /api/walks?q=yyyy-MM`
///
/// CSV unless the caller asks for something else, in which case the JSON
/// summary is returned.
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn walks(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let month = ctx.param("q").unwrap_or_default();
    let wants_csv = ctx.accept.as_deref().is_none_or(|a| a == CSV);

    if wants_csv {
        let path = format!("walks/{month}.csv");
        let bytes = state
            .store
            .read_bytes(&path)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no walks recorded for {month}")))?;
        return Ok(response::csv(bytes));
    }

    let summary: Value = state
        .store
        .read_json(&format!("walks/{month}.json"))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no walks recorded for {month}")))?;
    Ok(response::json(&summary))
}
