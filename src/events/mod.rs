//! Events: the data model and the URL importer.

pub mod importer;
pub mod model;

pub use importer::{EventImporter, HttpFetcher, PageFetcher};
pub use model::{Event, EventSource, EventUpdate, NewEvent};
