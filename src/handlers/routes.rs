//! Route maps and proximity lookups.
//!
//! - `GET /api/routes?date=yyyy-MM-dd[&idx=N]` - the day's routes as a map
//! - `GET /api/routes?nearPoint=lat,lon[&nearPointRadius=M]` - dates walked near a point
//! - `GET /api/walksNearPoint?targetPoint=lat,lon&radius=M` - same search, explicit names

use std::sync::Arc;

use axum::response::Response;
use serde_json::{Map, json};
use tracing::{debug, instrument};

use super::util::require_param;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::geo::{Coordinate, ProximityQuery, find_dates_near};
use crate::metrics;
use crate::models::{Feature, FeatureCollection, Geometry, RouteInstance};
use crate::response;
use crate::state::AppState;
use crate::validation::{
    DEFAULT_NEAR_POINT_RADIUS_M, is_iso_date, month_of, parse_index, parse_point, parse_radius,
};

const ROUTE_STROKE: &str = "#ff0000";
const ROUTE_STROKE_WIDTH: u32 = 5;
const NEAR_POINT_MISSING: &str = "targetPoint and radius must be provided";

pub fn validate_walk_routes(ctx: &RequestContext) -> AppResult<()> {
    if let Some(point) = ctx.param("nearPoint") {
        parse_point(point, "nearPoint")?;
        if let Some(radius) = ctx.param("nearPointRadius") {
            parse_radius(radius, "nearPointRadius")?;
        }
        return Ok(());
    }

    let Some(date) = ctx.param("date") else {
        return Err(AppError::BadRequest(
            "query parameter date or nearPoint must be provided".to_string(),
        ));
    };
    if !is_iso_date(date) {
        return Err(AppError::BadRequest(
            "date must be provided and in yyyy-MM-dd format".to_string(),
        ));
    }
    if let Some(idx) = ctx.param("idx") {
        parse_index(idx)?;
    }
    Ok(())
}

#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn walk_routes(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    if let Some(point) = ctx.param("nearPoint") {
        let target = parse_point(point, "nearPoint")?;
        let radius_m = match ctx.param("nearPointRadius") {
            Some(raw) => parse_radius(raw, "nearPointRadius")?,
            None => DEFAULT_NEAR_POINT_RADIUS_M,
        };
        return dates_near(state, ctx, target, radius_m).await;
    }

    let date = ctx
        .param("date")
        .ok_or_else(|| AppError::BadRequest("date must be provided and in yyyy-MM-dd format".into()))?;
    let idx = ctx.param("idx").map(parse_index).transpose()?;

    let routes = state.store.month_routes(month_of(date)).await?.unwrap_or_default();
    let collection = assemble_routes(state, ctx, &routes, date, idx)?;
    response::map(ctx, &collection)
}

pub fn validate_walks_near_point(ctx: &RequestContext) -> AppResult<()> {
    let (Some(point), Some(radius)) = (ctx.param("targetPoint"), ctx.param("radius")) else {
        return Err(AppError::BadRequest(NEAR_POINT_MISSING.to_string()));
    };
    parse_point(point, "targetPoint")?;
    parse_radius(radius, "radius")?;
    Ok(())
}

#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn walks_near_point(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let target = parse_point(require_param(ctx, "targetPoint", NEAR_POINT_MISSING)?, "targetPoint")?;
    let radius_m = parse_radius(require_param(ctx, "radius", NEAR_POINT_MISSING)?, "radius")?;
    dates_near(state, ctx, target, radius_m).await
}

async fn dates_near(
    state: &AppState,
    ctx: &RequestContext,
    target: Coordinate,
    radius_m: f64,
) -> AppResult<Response> {
    let query = ProximityQuery {
        target,
        radius_m,
        is_authorized: ctx.is_authenticated(),
    };
    let dates = find_dates_near(&state.store, Arc::clone(&state.zones), query).await?;
    Ok(response::json(&dates))
}

/// The date's routes, redacted for the caller, as `LineString` features.
fn assemble_routes(
    state: &AppState,
    ctx: &RequestContext,
    routes: &[RouteInstance],
    date: &str,
    idx: Option<usize>,
) -> AppResult<FeatureCollection> {
    let for_date: Vec<&RouteInstance> = routes.iter().filter(|r| r.date == date).collect();
    if for_date.is_empty() {
        return Err(AppError::NotFound(format!(
            "failed to find any walks for date {date}"
        )));
    }
    if let Some(idx) = idx
        && idx >= for_date.len()
    {
        return Err(AppError::BadRequest(format!(
            "idx must be at least 0 and less than {} for date {date}, received [{idx}]",
            for_date.len()
        )));
    }

    let authorized = ctx.is_authenticated();
    let mut features = Vec::new();
    for (walk_idx, walk) in for_date.into_iter().enumerate() {
        if idx.is_some_and(|i| i != walk_idx) {
            continue;
        }
        let coords = walk.coords.clone().ok_or_else(|| {
            AppError::Internal(format!("[{date}] walk [{walk_idx}] is missing coords"))
        })?;
        let total = coords.len();
        let kept = state.zones.redact_coordinates(coords, authorized)?;
        metrics::record_points_redacted(total - kept.len());

        features.push(route_feature(&walk.date, &kept));
    }
    debug!(date, features = features.len(), "Routes assembled");
    Ok(FeatureCollection::new(features))
}

fn route_feature(date: &str, points: &[Coordinate]) -> Feature {
    let mut properties = Map::new();
    properties.insert("date".into(), json!(date));
    properties.insert("stroke".into(), json!(ROUTE_STROKE));
    properties.insert("stroke-width".into(), json!(ROUTE_STROKE_WIDTH));
    properties.insert("stroke-opacity".into(), json!(1));
    Feature::new(
        Geometry::LineString(points.iter().map(Coordinate::geojson_position).collect()),
        properties,
    )
}
