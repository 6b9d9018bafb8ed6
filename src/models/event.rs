use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

use crate::geo::Coordinate;

/// Fields produced by the footage pipeline that never leave the server.
pub const INTERNAL_EVENT_FIELDS: [&str; 3] = ["walkStartTime", "walkTrimmedOffset", "walkExif"];

/// A point-in-time sighting recorded during a walk.
///
/// Only the fields the service filters on are typed; everything else the
/// ingestion scripts write is carried through untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Stable event identifier
    pub id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location, with the capture time as the optional third element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coordinate>,
    /// License plate observations as `[jurisdiction, value]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plates: Option<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,
    /// Offset into the published video, `HH:MM:SS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trimmed_start: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn has_plates(&self) -> bool {
        self.plates.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Epoch-millisecond capture timestamp written by the ingestion scripts.
    pub fn timestamp_ms(&self) -> Option<f64> {
        self.number_field("timestamp")
    }

    /// Manually recorded time mark, epoch milliseconds.
    pub fn mark_ms(&self) -> Option<f64> {
        self.number_field("mark")
    }

    /// Time used for ordering: the point's timestamp, else the mark.
    pub fn sort_time(&self) -> Option<f64> {
        self.coords
            .and_then(|c| c.timestamp_ms)
            .map(|t| t as f64)
            .or_else(|| self.mark_ms())
    }

    /// Residential sighting flag.
    pub fn is_resi(&self) -> bool {
        self.extra.get("resi").is_some_and(is_truthy)
    }

    pub fn tags(&self) -> Option<&Value> {
        self.extra.get("tags")
    }

    /// Plates rendered as `"WA ABC123, OR XYZ789"`.
    pub fn plates_label(&self) -> Option<String> {
        self.plates.as_ref().map(|plates| {
            plates
                .iter()
                .map(|(jurisdiction, value)| format!("{jurisdiction} {value}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
    }

    /// Remove pipeline-only fields before the event is returned.
    pub fn strip_internal_fields(&mut self) {
        for key in INTERNAL_EVENT_FIELDS {
            self.extra.remove(key);
        }
    }

    fn number_field(&self, key: &str) -> Option<f64> {
        match self.extra.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .filter(|v| *v != 0.0)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// An event identifier as written in the archive, a string or a number.
///
/// Requests address events by the id's text, while responses echo the
/// stored value with its original JSON type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventId {
    Text(String),
    Number(Number),
}

impl EventId {
    /// Whether a path or query value names this event.
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            EventId::Text(s) => s == raw,
            EventId::Number(n) => n.to_string() == raw,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Text(s) => f.write_str(s),
            EventId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl PartialEq<&str> for EventId {
    fn eq(&self, other: &&str) -> bool {
        self.matches(other)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(EventId::Text(s)),
            Value::Number(n) => Ok(EventId::Number(n)),
            other => Err(serde::de::Error::custom(format!(
                "event id must be a string or number, got {other}"
            ))),
        }
    }
}

/// An events file is either an id-keyed map or a plain array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventsFile {
    List(Vec<Event>),
    Keyed(Map<String, Value>),
}

impl EventsFile {
    pub fn into_events(self) -> Result<Vec<Event>, serde_json::Error> {
        match self {
            EventsFile::List(events) => Ok(events),
            EventsFile::Keyed(map) => map.into_iter().map(|(_, v)| serde_json::from_value(v)).collect(),
        }
    }
}
