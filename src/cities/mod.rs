//! Monitored cities and their JSON-file store
//!
//! Each city carries exactly one area of interest (a radius around its
//! center point or a GeoJSON polygon). The store keeps the list in a JSON
//! array file with timestamped backups of every previous version.

mod model;
mod store;

pub use model::{Aoi, City, CityDraft, CityError, normalize_segment};
pub use store::{CityStore, DEFAULT_BACKUP_LIMIT, StoreError};
