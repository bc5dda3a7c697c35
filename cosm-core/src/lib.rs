//! Core domain types for the cosm replica engine.
//!
//! This crate holds everything the engine reasons about without touching
//! I/O: the feature model, bounding-box and spherical geometry helpers,
//! orientation maths, the traffic-sign catalogue and the two collaborator
//! traits, [`SpatialStore`] and [`FeatureSource`], that adapters implement.

pub mod bbox;
pub mod geojson;
pub mod geometry;
pub mod model;
pub mod orientation;
pub mod sign;
pub mod source;
pub mod store;

pub use bbox::{BBoxArg, BBoxParseError, ViewportKey, area_deg2, double_pad};
pub use geojson::GeoJsonError;
pub use geometry::NearestOnLine;
pub use model::{
    CoverageRecord, DERIVED_ID_PREFIX, DerivedPoint, FeatureBatch, FeatureEnvelope, FeatureId,
    FeatureKind, LineFeature, MAX_FEATURE_ID, Membership, PointFeature, Tags, validate_feature_id,
};
pub use orientation::{Direction, DirectionChoices, DirectionOrigin, Orientation};
pub use sign::{Affects, SignKind, SignParseError, TagPredicate, Target, TargetKind};
pub use source::{FeatureSource, FetchError};
pub use store::{
    CoverageRow, LineGeometryRow, NearestLineRow, RawFeatureRow, SpatialStore, StoreError,
    TargetNodeRow, UpsertSummary,
};
