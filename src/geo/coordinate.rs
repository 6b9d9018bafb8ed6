//! Canonical point and bounding-box types.
//!
//! Archive files written over the years encode points in two shapes:
//!
//! - tuples: `[lat, lon]` or `[lat, lon, timestamp]`, numbers or numeric strings
//! - objects: `{"lat": .., "lon": ..}` (also `lng`, `latitude`, `longitude`)
//!
//! Both deserialize into [`Coordinate`]; nothing downstream sees the raw shape.

use chrono::DateTime;
use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Reasons a raw point cannot be normalized.
#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("point must be an array or an object, got {0}")]
    UnsupportedShape(&'static str),

    #[error("point is missing its {0}")]
    Missing(&'static str),

    #[error("{field} is not a number: {raw}")]
    NotANumber { field: &'static str, raw: String },

    #[error("{field} {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },
}

/// A point on the earth with an optional capture time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
    /// Capture time in epoch milliseconds.
    pub timestamp_ms: Option<i64>,
}

impl Coordinate {
    /// Build a validated coordinate.
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::OutOfRange {
                field: "latitude",
                value: lat,
            });
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(CoordinateError::OutOfRange {
                field: "longitude",
                value: lon,
            });
        }
        Ok(Self {
            lat,
            lon,
            timestamp_ms: None,
        })
    }

    pub fn with_timestamp(mut self, timestamp_ms: Option<i64>) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Normalize either archived encoding.
    pub fn from_value(value: &Value) -> Result<Self, CoordinateError> {
        match value {
            Value::Array(items) => {
                let lat = number_field(items.first(), "latitude")?;
                let lon = number_field(items.get(1), "longitude")?;
                Ok(Self::new(lat, lon)?.with_timestamp(items.get(2).and_then(timestamp_of)))
            }
            Value::Object(map) => {
                let lat = map.get("lat").or_else(|| map.get("latitude"));
                let lon = map
                    .get("lon")
                    .or_else(|| map.get("lng"))
                    .or_else(|| map.get("longitude"));
                let ts = map.get("timestamp").or_else(|| map.get("time"));
                let lat = number_field(lat, "latitude")?;
                let lon = number_field(lon, "longitude")?;
                Ok(Self::new(lat, lon)?.with_timestamp(ts.and_then(timestamp_of)))
            }
            Value::Null => Err(CoordinateError::UnsupportedShape("null")),
            Value::Bool(_) => Err(CoordinateError::UnsupportedShape("boolean")),
            Value::Number(_) => Err(CoordinateError::UnsupportedShape("number")),
            Value::String(_) => Err(CoordinateError::UnsupportedShape("string")),
        }
    }

    /// Parse a `"lat,lon"` query value.
    pub fn parse_pair(raw: &str) -> Result<Self, CoordinateError> {
        let mut parts = raw.split(',').map(str::trim);
        let lat = parse_number(parts.next(), "latitude")?;
        let lon = parse_number(parts.next(), "longitude")?;
        Self::new(lat, lon)
    }

    /// `[lon, lat]` position as GeoJSON orders it.
    pub fn geojson_position(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

fn number_field(value: Option<&Value>, field: &'static str) -> Result<f64, CoordinateError> {
    match value {
        None | Some(Value::Null) => Err(CoordinateError::Missing(field)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| CoordinateError::NotANumber {
            field,
            raw: n.to_string(),
        }),
        Some(Value::String(s)) => parse_number(Some(s), field),
        Some(other) => Err(CoordinateError::NotANumber {
            field,
            raw: other.to_string(),
        }),
    }
}

fn parse_number(raw: Option<&str>, field: &'static str) -> Result<f64, CoordinateError> {
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or(CoordinateError::Missing(field))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| CoordinateError::NotANumber {
            field,
            raw: raw.to_string(),
        })
}

/// Epoch milliseconds from a number, numeric string or RFC 3339 string.
fn timestamp_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.timestamp_millis())),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Coordinate::from_value(&value).map_err(D::Error::custom)
    }
}

/// Serialized as the tuple shape, `[lat, lon]` or `[lat, lon, ts]`.
impl Serialize for Coordinate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.timestamp_ms.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.lat)?;
        seq.serialize_element(&self.lon)?;
        if let Some(ts) = self.timestamp_ms {
            seq.serialize_element(&ts)?;
        }
        seq.end()
    }
}

/// Axis-aligned lat/lon envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Smallest box holding every point, `None` for an empty slice.
    pub fn enclosing(points: &[Coordinate]) -> Option<Self> {
        let first = points.first()?;
        let init = Self {
            min_lat: first.lat,
            min_lng: first.lon,
            max_lat: first.lat,
            max_lng: first.lon,
        };
        Some(points.iter().fold(init, |b, p| Self {
            min_lat: b.min_lat.min(p.lat),
            min_lng: b.min_lng.min(p.lon),
            max_lat: b.max_lat.max(p.lat),
            max_lng: b.max_lng.max(p.lon),
        }))
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lng
            && point.lon <= self.max_lng
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tuple_shape_with_timestamp() {
        let c: Coordinate = serde_json::from_value(json!([47.61, -122.33, 1700000000000_i64])).unwrap();
        assert_eq!(c.lat, 47.61);
        assert_eq!(c.lon, -122.33);
        assert_eq!(c.timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_tuple_shape_with_string_numbers() {
        let c: Coordinate = serde_json::from_value(json!(["47.61", "-122.33"])).unwrap();
        assert_eq!(c.lat, 47.61);
        assert_eq!(c.timestamp_ms, None);
    }

    #[test]
    fn test_object_shapes_agree() {
        let a: Coordinate = serde_json::from_value(json!({"lat": 1.5, "lon": 2.5})).unwrap();
        let b: Coordinate = serde_json::from_value(json!({"lat": 1.5, "lng": 2.5})).unwrap();
        let c: Coordinate =
            serde_json::from_value(json!({"latitude": 1.5, "longitude": 2.5})).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_iso_timestamp_in_tuple() {
        let c: Coordinate =
            serde_json::from_value(json!([1.0, 2.0, "2023-05-01T12:00:00Z"])).unwrap();
        assert_eq!(c.timestamp_ms, Some(1_682_942_400_000));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = Coordinate::from_value(&json!([91.0, 0.0])).unwrap_err();
        assert!(matches!(err, CoordinateError::OutOfRange { field: "latitude", .. }));
    }

    #[test]
    fn test_rejects_missing_longitude() {
        let err = Coordinate::from_value(&json!({"lat": 1.0})).unwrap_err();
        assert_eq!(err, CoordinateError::Missing("longitude"));
    }

    #[test]
    fn test_parse_pair() {
        let c = Coordinate::parse_pair("47.6, -122.3").unwrap();
        assert_eq!((c.lat, c.lon), (47.6, -122.3));
        assert!(Coordinate::parse_pair("47.6").is_err());
        assert!(Coordinate::parse_pair("north,west").is_err());
    }

    #[test]
    fn test_serializes_as_tuple() {
        let c = Coordinate::new(1.0, 2.0).unwrap().with_timestamp(Some(5));
        assert_eq!(serde_json::to_value(c).unwrap(), json!([1.0, 2.0, 5]));
    }

    #[test]
    fn test_bounding_box_enclosing() {
        let pts = [
            Coordinate::new(1.0, 5.0).unwrap(),
            Coordinate::new(-2.0, 7.0).unwrap(),
        ];
        let b = BoundingBox::enclosing(&pts).unwrap();
        assert_eq!(b.min_lat, -2.0);
        assert_eq!(b.max_lng, 7.0);
        assert!(pts.iter().all(|p| b.contains(p)));
        assert!(BoundingBox::enclosing(&[]).is_none());
    }
}
