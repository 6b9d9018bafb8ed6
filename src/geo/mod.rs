//! Geospatial model and queries: points, distances, privacy zones and
//! proximity search over the monthly route files.

mod coordinate;
mod distance;
mod proximity;
mod zones;

pub use coordinate::{BoundingBox, Coordinate, CoordinateError};
pub use distance::{EARTH_RADIUS_METERS, haversine_distance, search_envelope, within_radius};
pub use proximity::{ProximityQuery, dates_near, find_dates_near};
pub use zones::{PrivacyZone, PrivacyZones, RedactionError, ZoneConfigError};
