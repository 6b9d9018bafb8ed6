use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geo::{BoundingBox, Coordinate};

/// One recorded route from a monthly `coords/{yyyy-mm}.json` file.
///
/// A date can have several instances when more than one walk happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInstance {
    /// `yyyy-mm-dd`
    pub date: String,
    /// Ordered track points
    #[serde(default)]
    pub coords: Option<Vec<Coordinate>>,
    /// Envelope of `coords`, present in newer files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    /// Free-form route metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Value>,
}

impl RouteInstance {
    pub fn points(&self) -> &[Coordinate] {
        self.coords.as_deref().unwrap_or_default()
    }
}
