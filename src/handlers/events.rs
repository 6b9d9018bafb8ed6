//! `GET /api/events`: filtered, time-ordered events.
//!
//! # Query Parameters
//!
//! - `id` - a single event, 404 when unknown
//! - `after`, `before` - epoch milliseconds or ISO datetime
//! - `hasPlate` - plate as `STATE VALUE`, punctuation ignored
//! - `plateOnly`, `nonPlateOnly`, `missingYoutubeIdOnly` - flags
//! - `nameIncludes`, `nameNotIncludes` - comma lists, case-insensitive, all terms must hold
//! - `targetPoint` + `maxRadius` - within `maxRadius` meters of `lat,lon`
//! - `select` - comma list of fields to return (JSON only)
//!
//! `Accept: application/geo+json` returns located events as points.

use std::cmp::Ordering;

use axum::response::Response;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::util::is_visible;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::geo::{Coordinate, within_radius};
use crate::models::{Event, Feature, FeatureCollection, Geometry};
use crate::response::{self, GEOJSON};
use crate::state::AppState;
use crate::validation::{comma_terms, parse_point, parse_radius, parse_time_bound, plate_key};

pub fn validate_events(ctx: &RequestContext) -> AppResult<()> {
    let mut errors = Vec::new();

    if ctx.param("hasPlate").is_some() && ctx.flag("nonPlateOnly") {
        errors.push("hasPlate and nonPlateOnly are mutually exclusive".to_string());
    }
    if ctx.flag("plateOnly") && ctx.flag("nonPlateOnly") {
        errors.push("plateOnly and nonPlateOnly are mutually exclusive".to_string());
    }
    match (ctx.param("targetPoint"), ctx.param("maxRadius")) {
        (None, Some(_)) => errors.push("targetPoint must be provided".to_string()),
        (Some(point), Some(radius)) => {
            if let Err(e) = parse_point(point, "targetPoint") {
                errors.push(e.to_string());
            }
            if let Err(e) = parse_radius(radius, "maxRadius") {
                errors.push(e.to_string());
            }
        }
        _ => {}
    }
    for bound in ["after", "before"] {
        if let Some(raw) = ctx.param(bound)
            && parse_time_bound(raw).is_none()
        {
            errors.push(format!("{bound} must be a valid timestamp or ISO datetime"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::BadRequest(errors.join(", ")))
    }
}

/// Filters parsed from an already validated request.
struct EventFilter {
    located_only: bool,
    has_plate: Option<String>,
    after: Option<f64>,
    before: Option<f64>,
    name_includes: Vec<String>,
    name_excludes: Vec<String>,
    near: Option<(Coordinate, f64)>,
    plate_only: bool,
    non_plate_only: bool,
    missing_youtube_only: bool,
}

impl EventFilter {
    fn from_context(ctx: &RequestContext) -> AppResult<Self> {
        let near = match (ctx.param("targetPoint"), ctx.param("maxRadius")) {
            (Some(point), Some(radius)) => Some((
                parse_point(point, "targetPoint")?,
                parse_radius(radius, "maxRadius")?,
            )),
            _ => None,
        };
        Ok(Self {
            located_only: ctx.accepts(GEOJSON),
            has_plate: ctx.param("hasPlate").map(plate_key),
            after: ctx.param("after").and_then(parse_time_bound),
            before: ctx.param("before").and_then(parse_time_bound),
            name_includes: ctx.param("nameIncludes").map(comma_terms).unwrap_or_default(),
            name_excludes: ctx.param("nameNotIncludes").map(comma_terms).unwrap_or_default(),
            near,
            plate_only: ctx.flag("plateOnly"),
            non_plate_only: ctx.flag("nonPlateOnly"),
            missing_youtube_only: ctx.flag("missingYoutubeIdOnly"),
        })
    }

    fn matches(&self, event: &Event) -> bool {
        if self.located_only && event.coords.is_none() {
            return false;
        }
        if let Some(wanted) = &self.has_plate {
            let found = event.plates.iter().flatten().any(|(jurisdiction, value)| {
                format!("{jurisdiction}{}", plate_key(value)) == *wanted
            });
            if !found {
                return false;
            }
        }
        if let Some(after) = self.after
            && !in_bound(event, |t| t >= after)
        {
            return false;
        }
        if let Some(before) = self.before
            && !in_bound(event, |t| t <= before)
        {
            return false;
        }

        let name = event.name.as_deref().map(str::to_lowercase);
        if !self.name_includes.is_empty()
            && !name
                .as_deref()
                .is_some_and(|n| self.name_includes.iter().all(|t| n.contains(t.as_str())))
        {
            return false;
        }
        if let Some(n) = name.as_deref()
            && self.name_excludes.iter().any(|t| n.contains(t.as_str()))
        {
            return false;
        }

        if let Some((target, radius)) = &self.near
            && !event
                .coords
                .as_ref()
                .is_some_and(|c| within_radius(c, target, *radius))
        {
            return false;
        }
        if self.plate_only && !event.has_plates() {
            return false;
        }
        if self.non_plate_only && (event.name.is_none() || event.has_plates()) {
            return false;
        }
        if self.missing_youtube_only && event.youtube_id.as_deref().is_some_and(|id| !id.is_empty()) {
            return false;
        }
        true
    }
}

/// Capture timestamp or manual mark satisfies `test`.
fn in_bound(event: &Event, test: impl Fn(f64) -> bool) -> bool {
    event.timestamp_ms().is_some_and(&test) || event.mark_ms().is_some_and(&test)
}

fn by_time(a: &Event, b: &Event) -> Ordering {
    a.sort_time()
        .partial_cmp(&b.sort_time())
        .unwrap_or(Ordering::Equal)
}

#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn events(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let all = state.store.all_events().await?;

    if let Some(id) = ctx.param("id") {
        let mut event = all
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Failed to find event {id}")))?;
        if !is_visible(&state.zones, ctx, event.coords.as_ref())? {
            return Err(AppError::NotFound(format!("Failed to find event {id}")));
        }
        event.strip_internal_fields();
        return Ok(response::json(&event));
    }

    let filter = EventFilter::from_context(ctx)?;
    let mut hits = Vec::new();
    for mut event in all {
        if !filter.matches(&event) || !is_visible(&state.zones, ctx, event.coords.as_ref())? {
            continue;
        }
        event.strip_internal_fields();
        hits.push(event);
    }
    hits.sort_by(by_time);
    debug!(hits = hits.len(), "Events filtered");

    if filter.located_only {
        return response::geojson(&FeatureCollection::new(
            hits.iter().filter_map(point_feature).collect(),
        ));
    }

    match ctx.param("select") {
        Some(select) => {
            let fields: Vec<&str> = select.split(',').map(str::trim).collect();
            let projected = hits
                .iter()
                .map(|event| project(event, &fields))
                .collect::<AppResult<Vec<_>>>()?;
            Ok(response::json(&projected))
        }
        None => Ok(response::json(&hits)),
    }
}

/// Only the requested fields that the event actually has.
fn project(event: &Event, fields: &[&str]) -> AppResult<Map<String, Value>> {
    let Value::Object(mut full) = serde_json::to_value(event)? else {
        return Err(AppError::Internal("event did not serialize to an object".into()));
    };
    Ok(fields
        .iter()
        .filter_map(|f| full.remove(*f).map(|v| ((*f).to_string(), v)))
        .collect())
}

fn point_feature(event: &Event) -> Option<Feature> {
    let coords = event.coords?;
    let mut properties = Map::new();
    properties.insert("id".into(), json!(event.id));
    if let Some(name) = &event.name {
        properties.insert("name".into(), json!(name));
    }
    properties.insert(
        "time".into(),
        coords
            .timestamp_ms
            .filter(|t| *t != 0)
            .map_or_else(|| json!("Unknown"), |t| json!(t)),
    );
    if let Some(tags) = event.tags() {
        properties.insert("tags".into(), tags.clone());
    }
    if let Some(plates) = event.plates_label() {
        properties.insert("plates".into(), json!(plates));
    }
    if event.is_resi() {
        properties.insert("marker-color".into(), json!("#fd0006"));
        properties.insert("marker-size".into(), json!("medium"));
        properties.insert("marker-symbol".into(), json!("circle"));
    }
    Some(Feature::new(Geometry::Point(coords.geojson_position()), properties))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn ctx(uri: &str, accept: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().uri(uri);
        if let Some(accept) = accept {
            builder = builder.header("accept", accept);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        RequestContext::from_parts(&parts, "t".into(), b"")
    }

    fn event(value: Value) -> Event {
        serde_json::from_value(value).unwrap()
    }

    fn filter(uri: &str) -> EventFilter {
        EventFilter::from_context(&ctx(uri, None)).unwrap()
    }

    #[test]
    fn test_mutual_exclusion_messages_joined() {
        let err = validate_events(&ctx(
            "/api/events?plateOnly=true&nonPlateOnly=true&hasPlate=WA1",
            None,
        ))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "hasPlate and nonPlateOnly are mutually exclusive, plateOnly and nonPlateOnly are mutually exclusive"
        );
    }

    #[test]
    fn test_radius_without_point_and_bad_bounds() {
        let err = validate_events(&ctx("/api/events?maxRadius=10&after=soon", None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "targetPoint must be provided, after must be a valid timestamp or ISO datetime"
        );
        assert!(validate_events(&ctx("/api/events?after=2023-05-01&before=1700000000000", None)).is_ok());
    }

    #[test]
    fn test_has_plate_ignores_punctuation() {
        let f = filter("/api/events?hasPlate=WA%20ABC-123");
        assert!(f.matches(&event(json!({"id": 1, "plates": [["WA", "ABC 123"]]}))));
        assert!(!f.matches(&event(json!({"id": 2, "plates": [["OR", "ABC123"]]}))));
        assert!(!f.matches(&event(json!({"id": 3}))));
    }

    #[test]
    fn test_time_bounds_use_timestamp_or_mark() {
        let f = filter("/api/events?after=100&before=200");
        assert!(f.matches(&event(json!({"id": 1, "timestamp": 150}))));
        assert!(f.matches(&event(json!({"id": 2, "mark": 150}))));
        assert!(!f.matches(&event(json!({"id": 3, "timestamp": 250}))));
        assert!(!f.matches(&event(json!({"id": 4}))));
    }

    #[test]
    fn test_name_terms() {
        let f = filter("/api/events?nameIncludes=red,TRUCK&nameNotIncludes=parked");
        assert!(f.matches(&event(json!({"id": 1, "name": "Red pickup truck"}))));
        assert!(!f.matches(&event(json!({"id": 2, "name": "Red car"}))));
        assert!(!f.matches(&event(json!({"id": 3, "name": "Red truck, parked"}))));
        assert!(!f.matches(&event(json!({"id": 4}))));

        let excludes_only = filter("/api/events?nameNotIncludes=parked");
        assert!(excludes_only.matches(&event(json!({"id": 5}))));
    }

    #[test]
    fn test_plate_flags_and_youtube() {
        let plated = event(json!({"id": 1, "name": "Van", "plates": [["WA", "A1"]], "youtubeId": "x"}));
        let named = event(json!({"id": 2, "name": "Dog"}));
        let bare = event(json!({"id": 3}));

        assert!(filter("/api/events?plateOnly=true").matches(&plated));
        assert!(!filter("/api/events?plateOnly=true").matches(&named));
        assert!(filter("/api/events?nonPlateOnly=true").matches(&named));
        assert!(!filter("/api/events?nonPlateOnly=true").matches(&bare));
        assert!(!filter("/api/events?missingYoutubeIdOnly=true").matches(&plated));
        assert!(filter("/api/events?missingYoutubeIdOnly=true").matches(&named));
    }

    #[test]
    fn test_radius_filter() {
        let f = filter("/api/events?targetPoint=47.6,-122.3&maxRadius=100");
        assert!(f.matches(&event(json!({"id": 1, "coords": [47.6001, -122.3]}))));
        assert!(!f.matches(&event(json!({"id": 2, "coords": [47.7, -122.3]}))));
        assert!(!f.matches(&event(json!({"id": 3}))));
    }

    #[test]
    fn test_point_feature_properties() {
        let e = event(json!({
            "id": "e1",
            "name": "Truck",
            "coords": [47.6, -122.3, 1000],
            "plates": [["WA", "A1"]],
            "resi": true
        }));
        let feature = serde_json::to_value(point_feature(&e).unwrap()).unwrap();
        assert_eq!(feature["geometry"]["coordinates"], json!([-122.3, 47.6]));
        assert_eq!(feature["properties"]["time"], json!(1000));
        assert_eq!(feature["properties"]["plates"], json!("WA A1"));
        assert_eq!(feature["properties"]["marker-color"], json!("#fd0006"));

        let untimed = event(json!({"id": "e2", "coords": [1.0, 2.0]}));
        let feature = serde_json::to_value(point_feature(&untimed).unwrap()).unwrap();
        assert_eq!(feature["properties"]["time"], json!("Unknown"));
        assert!(feature["properties"].get("name").is_none());
    }

    #[test]
    fn test_numeric_ids_stay_numeric() {
        let e = event(json!({"id": 17, "coords": [1.0, 2.0]}));
        let feature = serde_json::to_value(point_feature(&e).unwrap()).unwrap();
        assert_eq!(feature["properties"]["id"], json!(17));
        assert_eq!(Value::Object(project(&e, &["id"]).unwrap()), json!({"id": 17}));
        assert!(e.id == "17");
    }

    #[test]
    fn test_projection_skips_absent_fields() {
        let e = event(json!({"id": "e1", "name": "Truck"}));
        let projected = project(&e, &["id", "youtubeId"]).unwrap();
        assert_eq!(Value::Object(projected), json!({"id": "e1"}));
    }

    #[test]
    fn test_sort_by_time() {
        let mut events = vec![
            event(json!({"id": "b", "coords": [1.0, 1.0, 300]})),
            event(json!({"id": "a", "mark": 100})),
            event(json!({"id": "c", "coords": [1.0, 1.0, 200]})),
        ];
        events.sort_by(by_time);
        let ids: Vec<_> = events.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, ["a", "c", "b"]);
    }
}
