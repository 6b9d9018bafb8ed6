//! Which dates have a route passing near a point.
//!
//! Each monthly file is scanned on its own task. Route instances carrying a
//! bounding box are skipped when the box cannot reach the search circle;
//! instances without one are always scanned point by point.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use super::coordinate::{BoundingBox, Coordinate};
use super::distance::{search_envelope, within_radius};
use super::zones::PrivacyZones;
use crate::error::{AppError, AppResult};
use crate::models::RouteInstance;
use crate::store::{ArchiveStore, load_routes_file};

/// Parameters of one proximity search.
#[derive(Debug, Clone, Copy)]
pub struct ProximityQuery {
    pub target: Coordinate,
    pub radius_m: f64,
    pub is_authorized: bool,
}

/// Dates among `routes` with at least one point within the radius.
///
/// With `envelope` set, instances whose bounds miss it are skipped. With
/// `hidden` set, points inside those zones never count as hits.
pub fn dates_near(
    routes: &[RouteInstance],
    target: &Coordinate,
    radius_m: f64,
    envelope: Option<&BoundingBox>,
    hidden: Option<&PrivacyZones>,
) -> BTreeSet<String> {
    let mut hits = BTreeSet::new();
    for instance in routes {
        if hits.contains(&instance.date) {
            continue;
        }
        if let (Some(env), Some(bounds)) = (envelope, instance.bounds.as_ref())
            && !env.intersects(bounds)
        {
            continue;
        }
        let hit = instance.points().iter().any(|p| {
            within_radius(p, target, radius_m) && !hidden.is_some_and(|zones| zones.contains(p))
        });
        if hit {
            hits.insert(instance.date.clone());
        }
    }
    hits
}

/// Search every monthly file concurrently and merge the dates.
#[instrument(skip(store, zones), fields(lat = query.target.lat, lon = query.target.lon, radius_m = query.radius_m))]
pub async fn find_dates_near(
    store: &ArchiveStore,
    zones: Arc<PrivacyZones>,
    query: ProximityQuery,
) -> AppResult<Vec<String>> {
    zones.ensure_usable(query.is_authorized)?;

    let envelope = search_envelope(&query.target, query.radius_m);
    if envelope.is_none() {
        debug!("Search circle touches a pole or the antimeridian, scanning without pruning");
    }

    let files = store.month_files().await?;
    let mut tasks: JoinSet<AppResult<BTreeSet<String>>> = JoinSet::new();
    for path in files {
        let zones = Arc::clone(&zones);
        tasks.spawn(scan_month(path, query, envelope, zones));
    }

    let mut dates = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let month_dates = joined.map_err(|e| {
            warn!(error = %e, "Proximity scan task failed");
            AppError::Internal(format!("proximity scan failed: {e}"))
        })??;
        dates.extend(month_dates);
    }

    debug!(hits = dates.len(), "Proximity search complete");
    Ok(dates.into_iter().collect())
}

async fn scan_month(
    path: PathBuf,
    query: ProximityQuery,
    envelope: Option<BoundingBox>,
    zones: Arc<PrivacyZones>,
) -> AppResult<BTreeSet<String>> {
    let routes = load_routes_file(&path).await?;
    let hidden = (!query.is_authorized).then_some(zones.as_ref());
    Ok(dates_near(
        &routes,
        &query.target,
        query.radius_m,
        envelope.as_ref(),
        hidden,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::geo::PrivacyZone;
    use proptest::prelude::*;

    fn pt(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn instance(date: &str, points: Vec<Coordinate>, with_bounds: bool) -> RouteInstance {
        RouteInstance {
            date: date.to_string(),
            bounds: if with_bounds {
                BoundingBox::enclosing(&points)
            } else {
                None
            },
            coords: Some(points),
            route: None,
        }
    }

    #[test]
    fn test_finds_date_within_radius() {
        let routes = vec![
            instance("2023-05-01", vec![pt(47.6, -122.3), pt(47.601, -122.3)], true),
            instance("2023-05-02", vec![pt(48.0, -122.0)], true),
        ];
        let target = pt(47.6001, -122.3);
        let env = search_envelope(&target, 50.0);
        let dates = dates_near(&routes, &target, 50.0, env.as_ref(), None);
        assert_eq!(dates.into_iter().collect::<Vec<_>>(), ["2023-05-01"]);
    }

    #[test]
    fn test_no_nearby_points_is_empty() {
        let routes = vec![instance("2023-05-01", vec![pt(10.0, 10.0)], false)];
        assert!(dates_near(&routes, &pt(0.0, 0.0), 100.0, None, None).is_empty());
    }

    #[test]
    fn test_hidden_points_do_not_count() {
        let routes = vec![instance("2023-05-01", vec![pt(47.6, -122.3)], true)];
        let zones = PrivacyZones::new(vec![PrivacyZone {
            center: pt(47.6, -122.3),
            radius_m: 100.0,
        }]);
        let target = pt(47.6, -122.3);
        assert!(dates_near(&routes, &target, 20.0, None, Some(&zones)).is_empty());
        assert_eq!(dates_near(&routes, &target, 20.0, None, None).len(), 1);
    }

    #[tokio::test]
    async fn test_find_dates_near_across_months() {
        let dir = tempfile::tempdir().unwrap();
        let coords = dir.path().join("coords");
        std::fs::create_dir_all(&coords).unwrap();
        std::fs::write(
            coords.join("2023-05.json"),
            r#"[{"date":"2023-05-02","coords":[[47.6,-122.3]],"bounds":{"minLat":47.6,"minLng":-122.3,"maxLat":47.6,"maxLng":-122.3}}]"#,
        )
        .unwrap();
        std::fs::write(
            coords.join("2019-01.json"),
            r#"[{"date":"2019-01-09","coords":[{"lat":47.6001,"lon":-122.3}]}]"#,
        )
        .unwrap();

        let store = ArchiveStore::new(dir.path());
        let query = ProximityQuery {
            target: pt(47.6, -122.3),
            radius_m: 20.0,
            is_authorized: true,
        };
        let dates = find_dates_near(&store, Arc::new(PrivacyZones::default()), query)
            .await
            .unwrap();
        assert_eq!(dates, ["2019-01-09", "2023-05-02"]);
    }

    #[tokio::test]
    async fn test_unauthorized_without_zones_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        let query = ProximityQuery {
            target: pt(0.0, 0.0),
            radius_m: 20.0,
            is_authorized: false,
        };
        let err = find_dates_near(&store, Arc::new(PrivacyZones::default()), query)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    fn arb_route() -> impl Strategy<Value = Vec<Coordinate>> {
        prop::collection::vec(
            (47.0f64..48.0, -123.0f64..-122.0).prop_map(|(lat, lon)| pt(lat, lon)),
            1..20,
        )
    }

    proptest! {
        #[test]
        fn prop_pruning_never_changes_result(
            routes in prop::collection::vec(arb_route(), 1..12),
            target in (47.0f64..48.0, -123.0f64..-122.0),
            radius in 1.0f64..20_000.0,
        ) {
            let instances: Vec<_> = routes
                .into_iter()
                .enumerate()
                .map(|(i, pts)| instance(&format!("2023-01-{:02}", i + 1), pts, true))
                .collect();
            let target = pt(target.0, target.1);
            let env = search_envelope(&target, radius);
            let pruned = dates_near(&instances, &target, radius, env.as_ref(), None);
            let full = dates_near(&instances, &target, radius, None, None);
            prop_assert_eq!(pruned, full);
        }
    }
}
