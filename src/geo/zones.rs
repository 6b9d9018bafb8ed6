//! Privacy zones and coordinate redaction.
//!
//! A privacy zone is a circular geofence. Callers without a valid token never
//! receive a coordinate that falls inside one. Redaction for such a caller
//! with no zones configured is a configuration error, not a pass-through.

use serde::Deserialize;
use thiserror::Error;

use super::coordinate::Coordinate;
use super::distance::within_radius;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedactionError {
    #[error("PRIVACY_ZONES is empty; refusing to serve coordinates to an unauthenticated caller")]
    NoZonesConfigured,
}

/// Reasons a zone list cannot be loaded.
#[derive(Debug, Error)]
pub enum ZoneConfigError {
    #[error("{0}")]
    Parse(#[from] serde_json::Error),

    /// A zone that matches nothing would let its interior through.
    #[error("zone {index} has radius {radius}; it must be a finite number of meters above 0")]
    InvalidRadius { index: usize, radius: f64 },
}

/// Circular area whose interior is withheld from unauthenticated callers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrivacyZone {
    #[serde(rename = "coords")]
    pub center: Coordinate,
    #[serde(rename = "radius")]
    pub radius_m: f64,
}

impl PrivacyZone {
    pub fn contains(&self, point: &Coordinate) -> bool {
        within_radius(point, &self.center, self.radius_m)
    }
}

/// The configured zone list, immutable after startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrivacyZones {
    zones: Vec<PrivacyZone>,
}

impl PrivacyZones {
    pub fn new(zones: Vec<PrivacyZone>) -> Self {
        Self { zones }
    }

    /// Build a zone list, refusing zones that could never contain a point.
    pub fn try_new(zones: Vec<PrivacyZone>) -> Result<Self, ZoneConfigError> {
        if let Some((index, zone)) = zones
            .iter()
            .enumerate()
            .find(|(_, z)| !z.radius_m.is_finite() || z.radius_m <= 0.0)
        {
            return Err(ZoneConfigError::InvalidRadius {
                index,
                radius: zone.radius_m,
            });
        }
        Ok(Self::new(zones))
    }

    /// Parse the `PRIVACY_ZONES` JSON array.
    pub fn from_json(raw: &str) -> Result<Self, ZoneConfigError> {
        Self::try_new(serde_json::from_str::<Vec<PrivacyZone>>(raw)?)
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether any zone contains `point`.
    pub fn contains(&self, point: &Coordinate) -> bool {
        self.zones.iter().any(|zone| zone.contains(point))
    }

    /// Fail when redaction is required but there is nothing to redact with.
    pub fn ensure_usable(&self, is_authorized: bool) -> Result<(), RedactionError> {
        if !is_authorized && self.zones.is_empty() {
            return Err(RedactionError::NoZonesConfigured);
        }
        Ok(())
    }

    /// Drop every point inside a zone unless the caller is authorized.
    ///
    /// Order of the surviving points is preserved.
    pub fn redact_coordinates(
        &self,
        points: Vec<Coordinate>,
        is_authorized: bool,
    ) -> Result<Vec<Coordinate>, RedactionError> {
        if is_authorized {
            return Ok(points);
        }
        self.ensure_usable(is_authorized)?;
        Ok(points.into_iter().filter(|p| !self.contains(p)).collect())
    }

    /// Whether a single located item may be shown.
    ///
    /// Items without a location carry nothing to redact.
    pub fn point_visible(
        &self,
        point: Option<&Coordinate>,
        is_authorized: bool,
    ) -> Result<bool, RedactionError> {
        if is_authorized {
            return Ok(true);
        }
        self.ensure_usable(is_authorized)?;
        Ok(point.is_none_or(|p| !self.contains(p)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pt(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn home() -> PrivacyZones {
        PrivacyZones::new(vec![PrivacyZone {
            center: pt(47.6, -122.3),
            radius_m: 200.0,
        }])
    }

    #[test]
    fn test_parse_config_shape() {
        let zones = PrivacyZones::from_json(
            r#"[{"coords":{"latitude":47.6,"longitude":-122.3},"radius":200}]"#,
        )
        .unwrap();
        assert_eq!(zones, home());
    }

    #[test]
    fn test_unusable_radius_rejected() {
        for radius in ["-5", "0", "-0.0"] {
            let raw = format!(
                r#"[{{"coords":{{"latitude":47.6,"longitude":-122.3}},"radius":{radius}}}]"#
            );
            let err = PrivacyZones::from_json(&raw).unwrap_err();
            assert!(matches!(err, ZoneConfigError::InvalidRadius { index: 0, .. }), "{radius}");
        }

        for radius in [f64::NAN, f64::INFINITY] {
            let zone = PrivacyZone {
                center: pt(47.6, -122.3),
                radius_m: radius,
            };
            let err = PrivacyZones::try_new(vec![home().zones[0].clone(), zone]).unwrap_err();
            assert!(matches!(err, ZoneConfigError::InvalidRadius { index: 1, .. }));
        }
    }

    #[test]
    fn test_malformed_zone_json_rejected() {
        assert!(matches!(
            PrivacyZones::from_json("51.5,-0.12,400"),
            Err(ZoneConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unauthorized_drops_points_inside() {
        let inside = pt(47.6005, -122.3);
        let outside = pt(47.61, -122.3);
        let out = home()
            .redact_coordinates(vec![outside, inside, outside], false)
            .unwrap();
        assert_eq!(out, vec![outside, outside]);
    }

    #[test]
    fn test_authorized_is_identity() {
        let pts = vec![pt(47.6, -122.3), pt(47.61, -122.3)];
        assert_eq!(home().redact_coordinates(pts.clone(), true).unwrap(), pts);
        assert_eq!(
            PrivacyZones::default()
                .redact_coordinates(pts.clone(), true)
                .unwrap(),
            pts
        );
    }

    #[test]
    fn test_empty_zones_unauthorized_is_error() {
        let err = PrivacyZones::default()
            .redact_coordinates(vec![pt(0.0, 0.0)], false)
            .unwrap_err();
        assert_eq!(err, RedactionError::NoZonesConfigured);
        assert!(err.to_string().contains("PRIVACY_ZONES"));
    }

    #[test]
    fn test_point_visibility() {
        let zones = home();
        assert!(!zones.point_visible(Some(&pt(47.6, -122.3)), false).unwrap());
        assert!(zones.point_visible(Some(&pt(47.7, -122.3)), false).unwrap());
        assert!(zones.point_visible(None, false).unwrap());
        assert!(zones.point_visible(Some(&pt(47.6, -122.3)), true).unwrap());
    }

    fn arb_point() -> impl Strategy<Value = Coordinate> {
        (47.58f64..47.62, -122.32f64..-122.28).prop_map(|(lat, lon)| pt(lat, lon))
    }

    proptest! {
        #[test]
        fn prop_no_contained_point_survives(points in prop::collection::vec(arb_point(), 0..64)) {
            let zones = home();
            let out = zones.redact_coordinates(points.clone(), false).unwrap();
            prop_assert!(out.iter().all(|p| !zones.contains(p)));
            let expected: Vec<_> = points.into_iter().filter(|p| !zones.contains(p)).collect();
            prop_assert_eq!(out, expected);
        }

        #[test]
        fn prop_authorized_unchanged(points in prop::collection::vec(arb_point(), 0..64)) {
            prop_assert_eq!(home().redact_coordinates(points.clone(), true).unwrap(), points);
        }
    }
}
