//! Response types for the OSM API v0.6 JSON endpoints.
//!
//! See: <https://wiki.openstreetmap.org/wiki/API_v0.6>

use cosm_core::{FeatureBatch, FeatureId, LineFeature, PointFeature, Tags, validate_feature_id};
use geo::Coord;
use log::warn;
use serde::Deserialize;

/// Body of `GET /api/0.6/map.json`.
#[derive(Debug, Deserialize)]
pub struct MapDocument {
    /// API version reported by the server.
    #[serde(default)]
    pub version: Option<String>,
    /// Software that produced the document.
    #[serde(default)]
    pub generator: Option<String>,
    /// Elements in server order: nodes, then ways, then relations.
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// One element of a [`MapDocument`].
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    /// A tagged or untagged point.
    Node {
        /// Raw identifier; may be negative in uploaded-but-unsaved data.
        id: i64,
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
        /// Remote version counter.
        #[serde(default)]
        version: Option<u64>,
        /// Last edit timestamp.
        #[serde(default)]
        timestamp: Option<String>,
        /// Free-form tags.
        #[serde(default)]
        tags: Tags,
    },
    /// An ordered list of node references.
    Way {
        /// Raw identifier.
        id: i64,
        /// Referenced nodes in order.
        #[serde(default)]
        nodes: Vec<i64>,
        /// Remote version counter.
        #[serde(default)]
        version: Option<u64>,
        /// Last edit timestamp.
        #[serde(default)]
        timestamp: Option<String>,
        /// Free-form tags.
        #[serde(default)]
        tags: Tags,
    },
    /// Relations and anything newer; not replicated.
    #[serde(other)]
    Other,
}

impl MapDocument {
    /// Convert to a [`FeatureBatch`], skipping invalid elements.
    ///
    /// Nodes with out-of-range identifiers or non-finite coordinates are
    /// dropped, as are ways referencing any such identifier.
    #[must_use]
    pub fn into_batch(self) -> FeatureBatch {
        let mut batch = FeatureBatch::default();
        for element in self.elements {
            match element {
                Element::Node {
                    id,
                    lat,
                    lon,
                    version,
                    timestamp,
                    tags,
                } => {
                    let Some(id) = validate_feature_id("node", id) else {
                        continue;
                    };
                    if !(lon.is_finite() && lat.is_finite()) {
                        warn!("Skipped feature: kind=node, id={id} (non-finite coordinates)");
                        continue;
                    }
                    batch.points.push(PointFeature {
                        id,
                        position: Coord { x: lon, y: lat },
                        version: version.unwrap_or(1),
                        tags,
                        observed_at: timestamp,
                    });
                }
                Element::Way {
                    id,
                    nodes,
                    version,
                    timestamp,
                    tags,
                } => {
                    let Some(id) = validate_feature_id("way", id) else {
                        continue;
                    };
                    let node_ids: Option<Vec<FeatureId>> = nodes
                        .into_iter()
                        .map(|node| validate_feature_id("way node", node))
                        .collect();
                    let Some(node_ids) = node_ids else {
                        warn!("Skipped feature: kind=way, id={id} (invalid node reference)");
                        continue;
                    };
                    batch.lines.push(LineFeature {
                        id,
                        node_ids,
                        version: version.unwrap_or(1),
                        tags,
                        observed_at: timestamp,
                    });
                }
                Element::Other => {}
            }
        }
        batch
    }
}

/// Body of `GET /api/capabilities.json`.
#[derive(Debug, Deserialize)]
pub struct CapabilitiesDocument {
    /// Limits advertised by the API.
    pub api: ApiLimits,
}

/// The `api` object of [`CapabilitiesDocument`].
#[derive(Debug, Deserialize)]
pub struct ApiLimits {
    /// Largest bounding box, in square degrees, a map request may cover.
    pub area: Maximum,
    /// Server-side request timeout.
    #[serde(default)]
    pub timeout: Option<Seconds>,
}

/// `{ "maximum": n }`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Maximum {
    /// The limit.
    pub maximum: f64,
}

/// `{ "seconds": n }`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Seconds {
    /// Duration in seconds.
    pub seconds: u64,
}

/// Body of `GET /api/versions.json`.
#[derive(Debug, Deserialize)]
pub struct VersionsDocument {
    /// Supported versions.
    pub api: SupportedVersions,
}

/// The `api` object of [`VersionsDocument`].
#[derive(Debug, Deserialize)]
pub struct SupportedVersions {
    /// Version strings such as `"0.6"`.
    pub versions: Vec<String>,
}
