mod api;
mod event;
mod plate;
mod walk;

pub use api::{
    CacheInvalidationRequest, Feature, FeatureCollection, Geometry, HealthResponse,
};
pub use event::{Event, EventId, EventsFile, INTERNAL_EVENT_FIELDS};
pub use plate::{PlateIndex, PlateLocation, PlateSighting};
pub use walk::RouteInstance;
