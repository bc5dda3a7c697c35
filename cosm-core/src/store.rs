//! The spatial store collaborator.
//!
//! `SpatialStore` is the statement surface the replica engine drives. Each
//! method corresponds to one prepared statement owned by the implementation;
//! rows carrying geometry cross the boundary as GeoJSON text so callers never
//! depend on the store's internal representation.

use std::error::Error as StdError;

use async_trait::async_trait;
use geo::{Coord, Rect};
use thiserror::Error;

use crate::geojson::GeoJsonError;
use crate::model::{FeatureId, LineFeature, Membership, PointFeature};
use crate::sign::TagPredicate;

/// Errors raised by [`SpatialStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A statement failed inside the storage backend.
    #[error("statement `{statement}` failed: {source}")]
    Database {
        /// Statement name.
        statement: &'static str,
        /// Backend error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// A statement returned a row that could not be interpreted.
    #[error("statement `{statement}` returned a malformed row: {message}")]
    MalformedRow {
        /// Statement name.
        statement: &'static str,
        /// What was wrong with the row.
        message: String,
    },
    /// Geometry could not be converted.
    #[error("geometry conversion failed: {0}")]
    Geometry(#[from] GeoJsonError),
    /// The store was closed and its statements released.
    #[error("the spatial store has been closed")]
    Closed,
    /// The worker running a statement stopped before reporting back.
    #[error("store worker failed: {message}")]
    Join {
        /// Worker failure description.
        message: String,
    },
}

impl StoreError {
    /// Wrap a backend error for `statement`.
    pub fn database(statement: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Database {
            statement,
            source: Box::new(source),
        }
    }
}

/// A stored feature in render form: geometry and tags as GeoJSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatureRow {
    /// Feature identity.
    pub id: FeatureId,
    /// Point position or line centreline.
    pub geometry: String,
    /// Tag object.
    pub tags: String,
    /// Derived width in metres, lines only.
    pub width: Option<f64>,
    /// Derived casing polygon, lines only.
    pub casing: Option<String>,
}

/// One result of the nearest-lines statement.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestLineRow {
    /// Matching line.
    pub line_id: FeatureId,
    /// Distance from the query point, in metres.
    pub distance_m: f64,
    /// Vertex index of the projection.
    pub index: usize,
    /// Arc length to the projection, in metres.
    pub location_m: f64,
    /// Projected point as a GeoJSON `Point`.
    pub point: String,
}

/// One result of the target-node statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetNodeRow {
    /// Node identity.
    pub id: FeatureId,
    /// Position as a GeoJSON `Point`.
    pub point: String,
    /// Tag object.
    pub tags: String,
    /// Remote version counter.
    pub version: u64,
    /// Every line referencing the node.
    pub line_ids: Vec<FeatureId>,
}

/// A line centreline with the vertex indices shared with other lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LineGeometryRow {
    /// Line identity.
    pub line_id: FeatureId,
    /// Centreline as a GeoJSON `LineString`.
    pub centreline: String,
    /// Ascending vertex indices whose node also belongs to another line.
    pub intersections: Vec<usize>,
}

/// One stored coverage record.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRow {
    /// Unix seconds at which the record was written.
    pub recorded_at: i64,
    /// Covered area as a GeoJSON `Polygon` or `MultiPolygon`.
    pub polygon: String,
}

/// Counters reported by the upsert statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Rows written.
    pub rows: usize,
    /// Rows whose stored geometry changed as a result.
    pub geometry_changed: usize,
}

/// Prepared-statement surface of the embedded spatial store.
///
/// Every call may suspend; implementations must not block the caller's
/// executor thread.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Difference between `requested` and the latest coverage polygon.
    ///
    /// Returns `None` when the difference has zero area.
    async fn uncovered_remainder(&self, requested: &Rect<f64>)
    -> Result<Option<String>, StoreError>;

    /// Append a coverage record covering everything already covered plus
    /// `fetched`.
    async fn record_coverage(&self, fetched: &Rect<f64>, recorded_at: i64)
    -> Result<(), StoreError>;

    /// All coverage records, oldest first.
    async fn coverage(&self) -> Result<Vec<CoverageRow>, StoreError>;

    /// Insert or replace points keyed by identity.
    async fn upsert_points(&self, points: &[PointFeature]) -> Result<UpsertSummary, StoreError>;

    /// Insert or replace lines, building centrelines from current points.
    async fn upsert_lines(&self, lines: &[LineFeature]) -> Result<UpsertSummary, StoreError>;

    /// Replace the membership rows of every line mentioned in `memberships`.
    async fn upsert_memberships(&self, memberships: &[Membership])
    -> Result<UpsertSummary, StoreError>;

    /// Run one bounded derived-geometry pass and report how many rows changed.
    async fn compute_missing_derived_geometry(&self) -> Result<usize, StoreError>;

    /// Points inside `bbox`.
    async fn points_in_bbox(&self, bbox: &Rect<f64>) -> Result<Vec<RawFeatureRow>, StoreError>;

    /// Lines whose extent intersects `bbox`.
    async fn lines_in_bbox(&self, bbox: &Rect<f64>) -> Result<Vec<RawFeatureRow>, StoreError>;

    /// Up to `limit` lines nearest to `point`, closest first.
    async fn nearest_lines(
        &self,
        point: Coord<f64>,
        limit: usize,
    ) -> Result<Vec<NearestLineRow>, StoreError>;

    /// Points inside `bbox` whose tags satisfy `predicate`.
    async fn find_target_nodes(
        &self,
        predicate: &TagPredicate,
        bbox: &Rect<f64>,
    ) -> Result<Vec<TargetNodeRow>, StoreError>;

    /// Centreline and intersections of one line, if stored with a centreline.
    async fn line_geometry(&self, line_id: FeatureId)
    -> Result<Option<LineGeometryRow>, StoreError>;

    /// Release every prepared statement; later calls fail with
    /// [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}
