//! Facade crate for the cosm spatial replica engine.
//!
//! This crate re-exports the core domain types and the replica engine, and
//! exposes the SQLite store and OSM API source behind feature flags.

#![forbid(unsafe_code)]

pub use cosm_core::{
    BBoxArg, CoverageRecord, DerivedPoint, Direction, FeatureBatch, FeatureEnvelope, FeatureId,
    FeatureKind, FeatureSource, FetchError, LineFeature, NearestOnLine, Orientation,
    PointFeature, SignKind, SpatialStore, StoreError, TagPredicate, Tags, TargetKind,
};
pub use cosm_replica::{
    Placement, Replica, ReplicaConfig, ReplicaError, Selection, SyncConfig, SyncOutcome,
    TapSelection, ViewportUpdate,
};

#[cfg(feature = "store-sqlite")]
pub use cosm_data::{OpenStoreError, SqliteSpatialStore, StoreOptions};

#[cfg(feature = "source-osm")]
pub use cosm_data::{OsmApiConfig, OsmApiSource, SourceBuildError};
