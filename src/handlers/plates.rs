//! License plate index and plate sighting maps.

use axum::response::Response;
use serde_json::{Map, json};
use tracing::{debug, instrument};

use super::util::cell_text;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::models::{Feature, FeatureCollection, Geometry, PlateIndex, PlateLocation, PlateSighting};
use crate::response::{self, CSV};
use crate::state::AppState;
use crate::validation::parse_positive_count;

const CSV_HEADER: &str = r#""plate","date","name","link","resi""#;

pub fn validate_plates(ctx: &RequestContext) -> AppResult<()> {
    if let Some(raw) = ctx.param("filterByCount") {
        parse_positive_count(raw, "filterByCount")?;
    }
    Ok(())
}

/// Options of `GET /api/plates`, applied in declaration order.
#[derive(Debug, Default)]
struct PlateQuery {
    filter_by_name: bool,
    name_contains: Option<String>,
    filter_by_count: Option<usize>,
    sort_by_count: bool,
}

impl PlateQuery {
    fn from_context(ctx: &RequestContext) -> AppResult<Self> {
        let name_contains = ctx.param("nameContains").map(str::to_uppercase);
        Ok(Self {
            filter_by_name: ctx.param("filterByName").is_some() || name_contains.is_some(),
            name_contains,
            filter_by_count: ctx
                .param("filterByCount")
                .map(|raw| parse_positive_count(raw, "filterByCount"))
                .transpose()?,
            sort_by_count: ctx.param("sortByCount").is_some(),
        })
    }

    fn apply(&self, mut index: PlateIndex) -> PlateIndex {
        if self.filter_by_name {
            index
                .entries
                .retain(|(_, sightings)| sightings.iter().any(has_name));
        }
        if let Some(needle) = &self.name_contains {
            for (_, sightings) in &mut index.entries {
                sightings.retain(|s| {
                    s.name
                        .as_deref()
                        .is_some_and(|n| n.to_uppercase().contains(needle.as_str()))
                });
            }
        }
        if let Some(min) = self.filter_by_count {
            index.entries.retain(|(_, sightings)| sightings.len() >= min);
        }
        if self.sort_by_count {
            index.entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        }
        index.entries.retain(|(_, sightings)| !sightings.is_empty());
        index
    }
}

fn has_name(sighting: &PlateSighting) -> bool {
    sighting.name.as_deref().is_some_and(|n| !n.is_empty())
}

/// `GET /api/plates`: the plate index as JSON, or CSV for `accept: text/csv`.
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn plates(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let query = PlateQuery::from_context(ctx)?;
    let index = query.apply(state.store.plate_index().await?);
    debug!(plates = index.len(), "Plate index filtered");

    if ctx.accepts(CSV) {
        return Ok(response::csv(to_csv(&index)));
    }
    Ok(response::json(&index))
}

fn to_csv(index: &PlateIndex) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for (plate, sightings) in &index.entries {
        for s in sightings {
            let cells = [
                quoted(plate),
                quoted(&s.date),
                quoted(s.name.as_deref().unwrap_or_default()),
                quoted(s.link.as_deref().unwrap_or_default()),
                quoted(&cell_text(s.resi.as_ref())),
            ];
            lines.push(cells.join(","));
        }
    }
    lines.join("\n")
}

/// A CSV cell with embedded quotes doubled.
fn quoted(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

pub fn validate_plate_coords(ctx: &RequestContext) -> AppResult<()> {
    if ctx.param("plate").is_none() && ctx.param("date").is_none() {
        return Err(AppError::BadRequest(
            "plate or date must be specified".to_string(),
        ));
    }
    Ok(())
}

/// `GET /api/plates/coords`: where a plate was seen, or every plate seen on a date.
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn plate_coords(state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
    let locations = state.store.plate_locations().await?;
    let (plate, date) = (ctx.param("plate"), ctx.param("date"));
    let matches = |loc: &PlateLocation| match plate {
        Some(plate) => loc.plate == plate,
        None => date.is_some_and(|d| loc.date == d),
    };

    let features = locations
        .iter()
        .filter(|loc| matches(loc))
        .map(|loc| {
            let mut properties = Map::new();
            properties.insert("date".into(), json!(loc.date));
            properties.insert("plate".into(), json!(loc.plate));
            Feature::new(Geometry::Point(loc.coords.geojson_position()), properties)
        })
        .collect();
    response::map(ctx, &FeatureCollection::new(features))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn ctx(uri: &str) -> RequestContext {
        let (parts, ()) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        RequestContext::from_parts(&parts, "t".into(), b"")
    }

    fn index() -> PlateIndex {
        serde_json::from_str(
            r#"{
                "WAAAA111": [{"date": "2023-01-01"}],
                "WABBB222": [{"date": "2023-01-02", "name": "Red van", "resi": true},
                             {"date": "2023-01-03", "name": "Blue van", "link": "https://x"}],
                "ORCCC333": [{"date": "2023-01-04", "name": "Truck"},
                             {"date": "2023-01-05"},
                             {"date": "2023-01-06"}]
            }"#,
        )
        .unwrap()
    }

    fn keys(index: &PlateIndex) -> Vec<&str> {
        index.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_filter_by_count_validation() {
        let err = validate_plates(&ctx("/api/plates?filterByCount=0")).unwrap_err();
        assert_eq!(err.to_string(), "filterByCount must be a number greater than 0");
        assert!(validate_plates(&ctx("/api/plates?filterByCount=2")).is_ok());
    }

    #[test]
    fn test_name_contains_implies_name_filter() {
        let query = PlateQuery::from_context(&ctx("/api/plates?nameContains=van")).unwrap();
        let filtered = query.apply(index());
        assert_eq!(keys(&filtered), ["WABBB222"]);
        assert_eq!(filtered.entries[0].1.len(), 2);
    }

    #[test]
    fn test_count_filter_and_sort() {
        let query = PlateQuery::from_context(&ctx("/api/plates?filterByCount=2&sortByCount=true")).unwrap();
        assert_eq!(keys(&query.apply(index())), ["ORCCC333", "WABBB222"]);

        let unsorted = PlateQuery::default().apply(index());
        assert_eq!(keys(&unsorted), ["WAAAA111", "WABBB222", "ORCCC333"]);
    }

    #[test]
    fn test_csv_rendering() {
        let mut idx = index();
        idx.entries.truncate(2);
        let csv = to_csv(&idx);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], r#""WAAAA111","2023-01-01","","","""#);
        assert_eq!(lines[2], r#""WABBB222","2023-01-02","Red van","","true""#);
        assert_eq!(lines[3], r#""WABBB222","2023-01-03","Blue van","https://x","""#);
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn test_csv_doubles_embedded_quotes() {
        let idx: PlateIndex = serde_json::from_str(
            r#"{"WACCC333": [{"date": "2023-02-01", "name": "the \"blue\" van"}]}"#,
        )
        .unwrap();
        let csv = to_csv(&idx);
        assert_eq!(
            csv.lines().nth(1).unwrap(),
            r#""WACCC333","2023-02-01","the ""blue"" van","","""#
        );
    }

    #[test]
    fn test_plate_coords_needs_selector() {
        let err = validate_plate_coords(&ctx("/api/plates/coords")).unwrap_err();
        assert_eq!(err.to_string(), "plate or date must be specified");
        assert!(validate_plate_coords(&ctx("/api/plates/coords?date=2023-01-01")).is_ok());
    }
}
