mod archive;
mod events;
mod external;
mod health;
mod jump;
mod login;
mod plates;
mod routes;
mod util;

use axum::Extension;
use axum::extract::State;
use axum::response::Response;

pub use health::{health_check, readiness_check};
pub use login::auth_response;

use crate::context::RequestContext;
use crate::dispatch::{RouteEntry, no_validation};
use crate::processor;
use crate::state::AppState;

/// Route table for `/api`, in match order.
pub fn api_routes() -> Vec<RouteEntry> {
    vec![
        RouteEntry {
            pattern: "/events",
            requires_auth: true,
            validate: events::validate_events,
            process: processor!(events::events),
        },
        RouteEntry {
            pattern: "/routes",
            requires_auth: false,
            validate: routes::validate_walk_routes,
            process: processor!(routes::walk_routes),
        },
        RouteEntry {
            pattern: "/walksNearPoint",
            requires_auth: false,
            validate: routes::validate_walks_near_point,
            process: processor!(routes::walks_near_point),
        },
        RouteEntry {
            pattern: "/globalStats",
            requires_auth: false,
            validate: no_validation,
            process: processor!(archive::global_stats),
        },
        RouteEntry {
            pattern: "/plates",
            requires_auth: true,
            validate: plates::validate_plates,
            process: processor!(plates::plates),
        },
        RouteEntry {
            pattern: "/plates/coords",
            requires_auth: true,
            validate: plates::validate_plate_coords,
            process: processor!(plates::plate_coords),
        },
        RouteEntry {
            pattern: "/yt-thumbnail",
            requires_auth: false,
            validate: external::validate_thumbnail,
            process: processor!(external::thumbnail),
        },
        RouteEntry {
            pattern: "/cache",
            requires_auth: true,
            validate: external::validate_cache,
            process: processor!(external::invalidate_cache),
        },
        RouteEntry {
            pattern: "/jumpToEvent",
            requires_auth: false,
            validate: jump::validate_jump_to_event,
            process: processor!(jump::jump_to_event),
        },
        RouteEntry {
            pattern: "/sunx",
            requires_auth: false,
            validate: external::validate_sun,
            process: processor!(external::sun),
        },
        RouteEntry {
            pattern: "/walks",
            requires_auth: false,
            validate: archive::validate_walks,
            process: processor!(archive::walks),
        },
        RouteEntry {
            pattern: "/youtubeIds",
            requires_auth: false,
            validate: no_validation,
            process: processor!(archive::youtube_ids),
        },
    ]
}

/// Entry point for every `/api/*` request.
pub async fn api(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    state.routes.dispatch(&state, &ctx).await
}
