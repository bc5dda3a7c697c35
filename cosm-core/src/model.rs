//! Replica data model: raw features, derived points and render envelopes.

use std::collections::HashMap;

use geo::{Coord, Geometry, MultiPolygon};
use log::warn;

use crate::geometry::NearestOnLine;

/// Identifier assigned to a feature by the remote source.
pub type FeatureId = u64;

/// OpenStreetMap-style free-form key/value tags.
pub type Tags = HashMap<String, String>;

/// Top bit marks a synthesised [`DerivedPoint`] identity.
pub const DERIVED_ID_PREFIX: u64 = 1 << 63;

/// Largest identifier accepted from the remote source.
///
/// Real identifiers keep the two top bits clear so they can never collide
/// with derived identities.
pub const MAX_FEATURE_ID: u64 = (1 << 62) - 1;

/// Validate a raw remote identifier.
///
/// Negative and oversized identifiers are skipped with a warning rather than
/// failing the whole document.
///
/// # Examples
/// ```
/// use cosm_core::{MAX_FEATURE_ID, validate_feature_id};
///
/// assert_eq!(validate_feature_id("node", 42), Some(42));
/// assert_eq!(validate_feature_id("node", -1), None);
/// assert_eq!(validate_feature_id("way", i64::MAX), None);
/// assert!(MAX_FEATURE_ID < u64::MAX);
/// ```
#[must_use]
pub fn validate_feature_id(kind: &str, raw_id: i64) -> Option<FeatureId> {
    match u64::try_from(raw_id) {
        Ok(id) if id <= MAX_FEATURE_ID => Some(id),
        Ok(_) => {
            warn!(
                "Skipped feature: kind={kind}, raw_id={raw_id} (exceeds supported maximum {MAX_FEATURE_ID})"
            );
            None
        }
        Err(_) => {
            warn!(
                "Skipped feature: kind={kind}, raw_id={raw_id} (negative identifiers are unsupported)"
            );
            None
        }
    }
}

/// A tagged point as fetched from the remote source.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use cosm_core::PointFeature;
///
/// let stop = PointFeature::new(7, Coord { x: 1.0, y: 2.0 })
///     .with_tag("highway", "stop")
///     .with_version(3);
/// assert_eq!(stop.version, 3);
/// assert_eq!(stop.tags.get("highway").map(String::as_str), Some("stop"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointFeature {
    /// Remote identifier.
    pub id: FeatureId,
    /// Position in lon/lat degrees.
    pub position: Coord<f64>,
    /// Remote version counter.
    pub version: u64,
    /// Free-form tags.
    pub tags: Tags,
    /// Timestamp reported by the remote source, if any.
    pub observed_at: Option<String>,
}

impl PointFeature {
    /// Construct an untagged point at version 1.
    #[must_use]
    pub fn new(id: FeatureId, position: Coord<f64>) -> Self {
        Self {
            id,
            position,
            version: 1,
            tags: Tags::new(),
            observed_at: None,
        }
    }

    /// Set the version counter.
    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add a single tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Record the remote timestamp.
    #[must_use]
    pub fn observed_at(mut self, timestamp: impl Into<String>) -> Self {
        self.observed_at = Some(timestamp.into());
        self
    }
}

/// A tagged polyline referencing its points by identifier.
///
/// The centreline is derived from the current positions of `node_ids` when
/// the line is stored; width and casing are computed later by the derived
/// geometry pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineFeature {
    /// Remote identifier.
    pub id: FeatureId,
    /// Ordered point identifiers defining the centreline.
    pub node_ids: Vec<FeatureId>,
    /// Remote version counter.
    pub version: u64,
    /// Free-form tags.
    pub tags: Tags,
    /// Timestamp reported by the remote source, if any.
    pub observed_at: Option<String>,
}

impl LineFeature {
    /// Construct an untagged line at version 1.
    #[must_use]
    pub fn new(id: FeatureId, node_ids: Vec<FeatureId>) -> Self {
        Self {
            id,
            node_ids,
            version: 1,
            tags: Tags::new(),
            observed_at: None,
        }
    }

    /// Set the version counter.
    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add a single tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Membership pairs `(node id, line id, vertex index)` for this line.
    pub fn memberships(&self) -> impl Iterator<Item = Membership> + '_ {
        self.node_ids
            .iter()
            .enumerate()
            .map(|(index, node_id)| Membership {
                node_id: *node_id,
                line_id: self.id,
                index,
            })
    }
}

/// One row of the node-to-line membership relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Membership {
    /// Referenced point.
    pub node_id: FeatureId,
    /// Referencing line.
    pub line_id: FeatureId,
    /// Vertex index of the point within the line.
    pub index: usize,
}

/// Features decoded from one remote bounding-box fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBatch {
    /// Points in document order.
    pub points: Vec<PointFeature>,
    /// Lines in document order.
    pub lines: Vec<LineFeature>,
}

impl FeatureBatch {
    /// Whether the fetch returned nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.lines.is_empty()
    }

    /// Every membership row implied by the batch's lines.
    #[must_use]
    pub fn memberships(&self) -> Vec<Membership> {
        self.lines.iter().flat_map(LineFeature::memberships).collect()
    }
}

/// The union of every fetched rectangle up to `recorded_at`.
///
/// Records are appended, never rewritten, and each one contains all
/// earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRecord {
    /// Unix seconds at which the record was written.
    pub recorded_at: i64,
    /// Covered area in lon/lat degrees.
    pub polygon: MultiPolygon<f64>,
}

/// A synthetic placement point projected onto a line's centreline.
///
/// Derived points live only for the duration of a placement session and are
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DerivedPoint {
    /// Synthesised identity, see [`DerivedPoint::id_for_line`].
    pub id: u64,
    /// Owning line.
    pub line_id: FeatureId,
    /// Projected position.
    pub position: Coord<f64>,
    /// Vertex index on the centreline.
    pub index: usize,
    /// Arc length from the first vertex, in metres.
    pub location_m: f64,
    /// Always `true`; distinguishes derived points in mixed collections.
    pub derived: bool,
}

impl DerivedPoint {
    /// Placement point for `line_id` at a projected position.
    #[must_use]
    pub const fn on_line(line_id: FeatureId, nearest: &NearestOnLine) -> Self {
        Self {
            id: Self::id_for_line(line_id),
            line_id,
            position: nearest.point,
            index: nearest.index,
            location_m: nearest.location_m,
            derived: true,
        }
    }

    /// Identity of the derived point belonging to `line_id`.
    ///
    /// # Examples
    /// ```
    /// use cosm_core::{DerivedPoint, MAX_FEATURE_ID};
    ///
    /// let id = DerivedPoint::id_for_line(12);
    /// assert!(id > MAX_FEATURE_ID);
    /// assert_eq!(DerivedPoint::line_for_id(id), Some(12));
    /// assert_eq!(DerivedPoint::line_for_id(12), None);
    /// ```
    #[must_use]
    pub const fn id_for_line(line_id: FeatureId) -> u64 {
        DERIVED_ID_PREFIX | line_id
    }

    /// Owning line of a derived identity, or `None` for real identifiers.
    #[must_use]
    pub const fn line_for_id(id: u64) -> Option<FeatureId> {
        if id & DERIVED_ID_PREFIX == 0 {
            None
        } else {
            Some(id & !DERIVED_ID_PREFIX)
        }
    }
}

/// What a [`FeatureEnvelope`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FeatureKind {
    /// A point feature.
    Point,
    /// A line whose casing has not been computed yet.
    Line,
    /// A line rendered by its buffered casing.
    Casing,
}

/// Generic render envelope: identity, geometry and tags.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeatureEnvelope {
    /// Feature identity.
    pub id: FeatureId,
    /// Rendering role.
    pub kind: FeatureKind,
    /// Geometry in lon/lat degrees.
    pub geometry: Geometry<f64>,
    /// Free-form tags.
    pub tags: Tags,
    /// Derived width in metres, lines only.
    pub width: Option<f64>,
}
