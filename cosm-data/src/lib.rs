//! Adapters for the replica engine's external collaborators.
//!
//! Responsibilities:
//! - Implement [`cosm_core::SpatialStore`] over an embedded SQLite database.
//! - Implement [`cosm_core::FeatureSource`] over the OSM API.
//! - Own the on-disk schema and the remote document format.
//!
//! Boundaries:
//! - Do not encode engine rules (live in `cosm-replica`).
//! - Keep blocking I/O off async executors.
//!
//! Invariants:
//! - No global mutable state.

#[cfg(feature = "source-osm")]
pub mod osm;
#[cfg(feature = "store-sqlite")]
pub mod store;

#[cfg(feature = "source-osm")]
pub use osm::{OsmApiConfig, OsmApiSource, SourceBuildError};
#[cfg(feature = "store-sqlite")]
pub use store::{OpenStoreError, SqliteSpatialStore, StoreOptions};
