use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    /// Whether the archive root is readable
    pub archive_readable: bool,
    /// Number of configured privacy zones
    pub privacy_zones: usize,
    /// Number of banned addresses currently held in memory
    pub banned_addresses: usize,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /api/cache`.
#[derive(Debug, Deserialize)]
pub struct CacheInvalidationRequest {
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}

/// GeoJSON geometry; only the shapes the service emits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
}

/// GeoJSON feature.
#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    pub properties: Map<String, Value>,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            kind: "Feature",
            properties,
            geometry,
        }
    }
}

/// GeoJSON feature collection.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection",
            features,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_collection_shape() {
        let mut props = Map::new();
        props.insert("date".into(), json!("2023-05-01"));
        let fc = FeatureCollection::new(vec![Feature::new(
            Geometry::LineString(vec![[-122.3, 47.6]]),
            props,
        )]);
        assert_eq!(
            serde_json::to_value(&fc).unwrap(),
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {"date": "2023-05-01"},
                    "geometry": {"type": "LineString", "coordinates": [[-122.3, 47.6]]}
                }]
            })
        );
    }

    #[test]
    fn test_point_geometry() {
        assert_eq!(
            serde_json::to_value(Geometry::Point([1.0, 2.0])).unwrap(),
            json!({"type": "Point", "coordinates": [1.0, 2.0]})
        );
    }
}
