//! Read-only queries against the replica.
//!
//! Render queries never fail for want of a store: before one is attached
//! they return empty collections. Every other query treats a missing store
//! as a precondition failure.

use std::sync::Arc;

use cosm_core::geojson::{decode_geometry, decode_line_string, decode_point, decode_tags};
use cosm_core::geometry::nearest_point_on_line;
use cosm_core::orientation::angle_and_direction;
use cosm_core::{
    DerivedPoint, FeatureEnvelope, FeatureId, FeatureKind, GeoJsonError, NearestOnLine,
    Orientation, PointFeature, RawFeatureRow, TagPredicate, double_pad,
};
use geo::{Coord, LineString, Rect};
use log::debug;

use crate::deferred::StatementSlot;
use crate::error::ReplicaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Point,
    Line,
}

/// Stored rows that parse into [`FeatureEnvelope`]s as they are iterated.
///
/// Iterating again starts from the first row; rows that fail to parse
/// yield an error without ending the iteration.
#[derive(Debug, Clone)]
pub struct FeatureCursor {
    rows: Arc<[RawFeatureRow]>,
    kind: RowKind,
}

impl FeatureCursor {
    fn new(rows: Vec<RawFeatureRow>, kind: RowKind) -> Self {
        Self {
            rows: rows.into(),
            kind,
        }
    }

    fn empty(kind: RowKind) -> Self {
        Self::new(Vec::new(), kind)
    }

    /// Number of rows behind the cursor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the cursor has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate from the first row, parsing lazily.
    pub fn iter(&self) -> impl Iterator<Item = Result<FeatureEnvelope, GeoJsonError>> + '_ {
        self.rows.iter().map(move |row| envelope(row, self.kind))
    }

    /// Parse every row, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// The first row's [`GeoJsonError`].
    pub fn collect_features(&self) -> Result<Vec<FeatureEnvelope>, GeoJsonError> {
        self.iter().collect()
    }
}

fn envelope(row: &RawFeatureRow, kind: RowKind) -> Result<FeatureEnvelope, GeoJsonError> {
    let (kind, geometry) = match (kind, &row.casing) {
        (RowKind::Point, _) => (FeatureKind::Point, &row.geometry),
        (RowKind::Line, Some(casing)) => (FeatureKind::Casing, casing),
        (RowKind::Line, None) => (FeatureKind::Line, &row.geometry),
    };
    Ok(FeatureEnvelope {
        id: row.id,
        kind,
        geometry: decode_geometry(geometry)?,
        tags: decode_tags(&row.tags)?,
        width: row.width,
    })
}

/// Points and lines for one render window.
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// Padded window that was queried.
    pub window: Rect<f64>,
    /// Points inside the window.
    pub points: FeatureCursor,
    /// Lines crossing the window, as casings where computed.
    pub lines: FeatureCursor,
}

/// One nearest-line result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestLine {
    /// Matching line.
    pub line_id: FeatureId,
    /// Projection of the query point onto the line.
    pub nearest: NearestOnLine,
}

/// A candidate anchor node and the lines through it.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetNode {
    /// The stored point.
    pub point: PointFeature,
    /// Every line referencing the point.
    pub line_ids: Vec<FeatureId>,
}

/// A line's centreline and the vertices it shares with other lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LineGeometry {
    /// Line identity.
    pub line_id: FeatureId,
    /// Current centreline.
    pub centreline: LineString<f64>,
    /// Ascending indices of shared vertices.
    pub intersections: Vec<usize>,
}

/// Render, nearest-line, target and orientation queries.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    slot: Arc<StatementSlot>,
}

impl QueryEngine {
    /// Query through `slot`.
    #[must_use]
    pub const fn new(slot: Arc<StatementSlot>) -> Self {
        Self { slot }
    }

    /// Points and lines around `bbox`, padded outward by its own extent.
    ///
    /// Returns empty cursors while no store is attached.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::Store`] if a statement fails.
    pub async fn features_in_viewport(&self, bbox: &Rect<f64>) -> Result<RenderResult, ReplicaError> {
        let window = double_pad(bbox);
        let Some(store) = self.slot.get() else {
            debug!("Render query before a store is attached; returning no data");
            return Ok(RenderResult {
                window,
                points: FeatureCursor::empty(RowKind::Point),
                lines: FeatureCursor::empty(RowKind::Line),
            });
        };
        let points = store.points_in_bbox(&window).await?;
        let lines = store.lines_in_bbox(&window).await?;
        Ok(RenderResult {
            window,
            points: FeatureCursor::new(points, RowKind::Point),
            lines: FeatureCursor::new(lines, RowKind::Line),
        })
    }

    /// Up to `limit` lines nearest `point`, closest first.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::StaleStatement`] without a store, or
    /// [`ReplicaError::Store`] if the statement fails or a projected point
    /// does not decode.
    pub async fn nearest_lines(
        &self,
        point: Coord<f64>,
        limit: usize,
    ) -> Result<Vec<NearestLine>, ReplicaError> {
        let store = self.slot.require("nearest_lines")?;
        store
            .nearest_lines(point, limit)
            .await?
            .into_iter()
            .map(|row| {
                Ok::<_, ReplicaError>(NearestLine {
                    line_id: row.line_id,
                    nearest: NearestOnLine {
                        point: decode_point(&row.point)?.0,
                        distance_m: row.distance_m,
                        index: row.index,
                        location_m: row.location_m,
                    },
                })
            })
            .collect()
    }

    /// Stored points inside `bbox` matching every clause of `predicate`.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::StaleStatement`] without a store, or
    /// [`ReplicaError::Store`] if the statement fails or a row does not
    /// decode.
    pub async fn find_targets(
        &self,
        predicate: &TagPredicate,
        bbox: &Rect<f64>,
    ) -> Result<Vec<TargetNode>, ReplicaError> {
        let store = self.slot.require("find_targets")?;
        store
            .find_target_nodes(predicate, bbox)
            .await?
            .into_iter()
            .map(|row| {
                let mut point = PointFeature::new(row.id, decode_point(&row.point)?.0)
                    .with_version(row.version);
                point.tags = decode_tags(&row.tags)?;
                Ok::<_, ReplicaError>(TargetNode {
                    point,
                    line_ids: row.line_ids,
                })
            })
            .collect()
    }

    /// Centreline and intersections of `line_id`.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::UnknownLine`] if the line is not stored with a
    /// centreline.
    pub async fn line_geometry(&self, line_id: FeatureId) -> Result<LineGeometry, ReplicaError> {
        let store = self.slot.require("line_geometry")?;
        let row = store
            .line_geometry(line_id)
            .await?
            .ok_or(ReplicaError::UnknownLine { id: line_id })?;
        Ok(LineGeometry {
            line_id,
            centreline: decode_line_string(&row.centreline)?,
            intersections: row.intersections,
        })
    }

    /// Project `point` onto the centreline of `line_id`.
    ///
    /// Used while a placement point is dragged along its line.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::UnknownLine`] if the line is not stored with a
    /// centreline.
    pub async fn project_onto_line(
        &self,
        line_id: FeatureId,
        point: Coord<f64>,
    ) -> Result<NearestOnLine, ReplicaError> {
        let geometry = self.line_geometry(line_id).await?;
        nearest_point_on_line(&geometry.centreline, point)
            .ok_or(ReplicaError::UnknownLine { id: line_id })
    }

    /// Bearing and inferred direction of `line_id` at a placement point.
    ///
    /// `None` when the line has a single vertex and so no bearing.
    ///
    /// # Errors
    ///
    /// As for [`QueryEngine::line_geometry`].
    pub async fn angle_and_direction(
        &self,
        line_id: FeatureId,
        nearest: &NearestOnLine,
    ) -> Result<Option<Orientation>, ReplicaError> {
        let geometry = self.line_geometry(line_id).await?;
        Ok(angle_and_direction(
            &geometry.centreline,
            nearest,
            &geometry.intersections,
        ))
    }

    /// Placement point for `line_id` at `nearest`.
    #[must_use]
    pub const fn derived_point(&self, line_id: FeatureId, nearest: &NearestOnLine) -> DerivedPoint {
        DerivedPoint::on_line(line_id, nearest)
    }
}
