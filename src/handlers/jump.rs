//! `GET /api/jumpToEvent?id=...`: redirect to the moment in the published
//! video where an event happens.

use axum::response::Response;
use tracing::{debug, instrument};

use super::util::{is_visible, require_param};
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::models::Event;
use crate::response;
use crate::state::AppState;
use crate::validation::parse_offset_seconds;

const ID_MISSING: &str = "query parameter id must be specified";

pub fn validate_jump_to_event(ctx: &RequestContext) -> AppResult<()> {
    require_param(ctx, "id", ID_MISSING).map(|_| ())
}

#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn jump_to_event(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let id = require_param(ctx, "id", ID_MISSING)?;
    let unknown = || AppError::BadRequest(format!("Failed to find event with ID [{id}]"));

    let event = state
        .store
        .all_events()
        .await?
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(unknown)?;
    if !is_visible(&state.zones, ctx, event.coords.as_ref())? {
        debug!(id, "Event hidden by a privacy zone");
        return Err(unknown());
    }

    response::found(&video_link(&event)?)
}

/// `https://youtu.be/{id}?t={seconds}` for an event with a published video.
fn video_link(event: &Event) -> AppResult<String> {
    let video = event
        .youtube_id
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest(format!("Event [{}] has no published video", event.id))
        })?;
    let seconds = event
        .trimmed_start
        .as_deref()
        .and_then(parse_offset_seconds)
        .unwrap_or(0);
    Ok(format!("https://youtu.be/{video}?t={seconds}"))
}
