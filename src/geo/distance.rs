//! Great-circle distance and the search envelope used for pruning.

use super::coordinate::{BoundingBox, Coordinate};

/// Mean earth radius used for every distance in the service.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Slack added to search envelopes so rounding never prunes a boundary hit.
const ENVELOPE_EPSILON_DEG: f64 = 1e-9;

/// Haversine distance between two points in meters.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Whether `point` lies within `radius_m` meters of `center` (inclusive).
pub fn within_radius(point: &Coordinate, center: &Coordinate, radius_m: f64) -> bool {
    haversine_distance(point, center) <= radius_m
}

/// Lat/lon box enclosing every point within `radius_m` of `center`.
///
/// Returns `None` when the circle touches a pole or crosses the
/// antimeridian; callers must then scan without pruning.
pub fn search_envelope(center: &Coordinate, radius_m: f64) -> Option<BoundingBox> {
    let angular = radius_m / EARTH_RADIUS_METERS;
    if !angular.is_finite() || angular < 0.0 {
        return None;
    }
    let delta_lat = angular.to_degrees();
    let min_lat = center.lat - delta_lat;
    let max_lat = center.lat + delta_lat;
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return None;
    }

    let ratio = angular.sin() / center.lat.to_radians().cos();
    if !(0.0..1.0).contains(&ratio) {
        return None;
    }
    let delta_lon = ratio.asin().to_degrees();
    let min_lng = center.lon - delta_lon;
    let max_lng = center.lon + delta_lon;
    if min_lng < -180.0 || max_lng > 180.0 {
        return None;
    }

    Some(BoundingBox {
        min_lat: min_lat - ENVELOPE_EPSILON_DEG,
        min_lng: min_lng - ENVELOPE_EPSILON_DEG,
        max_lat: max_lat + ENVELOPE_EPSILON_DEG,
        max_lng: max_lng + ENVELOPE_EPSILON_DEG,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_zero_distance() {
        let p = pt(47.6, -122.3);
        assert_eq!(haversine_distance(&p, &p), 0.0);
        assert!(within_radius(&p, &p, 0.0));
    }

    #[test]
    fn test_known_distance() {
        // Seattle to Portland is roughly 233 km
        let d = haversine_distance(&pt(47.6062, -122.3321), &pt(45.5152, -122.6784));
        assert!((d - 233_000.0).abs() < 2_000.0, "got {d}");
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = haversine_distance(&pt(0.0, 0.0), &pt(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_envelope_contains_circle_edge() {
        let center = pt(47.6, -122.3);
        let env = search_envelope(&center, 500.0).unwrap();
        // due north and due east at exactly the radius
        let north = pt(47.6 + (500.0 / EARTH_RADIUS_METERS).to_degrees(), -122.3);
        assert!(env.contains(&north));
        assert!(env.contains(&center));
        assert!(!env.contains(&pt(47.62, -122.3)));
    }

    #[test]
    fn test_envelope_disabled_near_pole_and_antimeridian() {
        assert!(search_envelope(&pt(89.999, 0.0), 1_000.0).is_none());
        assert!(search_envelope(&pt(0.0, 179.9999), 1_000.0).is_none());
        assert!(search_envelope(&pt(0.0, 0.0), 1_000.0).is_some());
    }
}
