use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::geo::Coordinate;

/// One sighting of a plate, from `plates/plates.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateSighting {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resi: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Plate → sightings, keeping the order of the file (or of a re-sort).
#[derive(Debug, Clone, Default)]
pub struct PlateIndex {
    pub entries: Vec<(String, Vec<PlateSighting>)>,
}

impl PlateIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PlateIndex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (plate, sightings) in &self.entries {
            map.serialize_entry(plate, sightings)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PlateIndex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = PlateIndex;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of plate to sightings")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((plate, sightings)) = access.next_entry()? {
                    entries.push((plate, sightings));
                }
                Ok(PlateIndex { entries })
            }
        }

        deserializer.deserialize_map(IndexVisitor)
    }
}

/// A located plate sighting, from `progressiveStats/plates.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlateLocation {
    pub plate: String,
    pub date: String,
    pub coords: Coordinate,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_index_keeps_file_order() {
        let raw = r#"{"ZZ1":[{"date":"2023-01-01"}],"AA1":[{"date":"2023-01-02","name":"Van"}]}"#;
        let index: PlateIndex = serde_json::from_str(raw).unwrap();
        assert_eq!(index.entries[0].0, "ZZ1");
        assert_eq!(index.entries[1].1[0].name.as_deref(), Some("Van"));
        assert_eq!(serde_json::to_string(&index).unwrap(), raw);
    }

    #[test]
    fn test_location_accepts_string_coords() {
        let loc: PlateLocation = serde_json::from_str(
            r#"{"plate":"WAABC123","date":"2023-01-01","coords":["47.6","-122.3"]}"#,
        )
        .unwrap();
        assert_eq!(loc.coords.lat, 47.6);
    }
}
