//! Embedded SQLite implementation of [`cosm_core::SpatialStore`].
//!
//! The database holds four tables: `nodes`, `ways`, the `node_ways`
//! membership relation and the append-only `coverage` log. Geometry is kept
//! as GeoJSON text alongside plain bounding-box columns so window queries
//! stay index-friendly without a spatial extension.
//!
//! Ways whose centreline could not be built, or whose nodes moved, are
//! flagged `dirty`; [`cosm_core::SpatialStore::compute_missing_derived_geometry`]
//! clears the flags in bounded batches and then refreshes width and casing
//! for every line whose casing revision lags its centreline revision.

mod derived;
mod fs;
mod schema;
mod sqlite;
mod statements;

pub use sqlite::{
    COVERAGE_TOLERANCE_DEG, DEFAULT_DERIVED_BATCH, OpenStoreError, SqliteSpatialStore,
    StoreOptions,
};
