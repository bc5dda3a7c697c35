//! GeoJSON text codec for geometry and tags crossing the store boundary.
//!
//! Stores exchange geometry as GeoJSON geometry objects and tags as flat
//! JSON objects, so no component depends on a store's native encoding.

use geo::{Geometry, LineString, MultiPolygon, Point};
use geozero::error::GeozeroError;
use geozero::{ToGeo, ToJson};
use thiserror::Error;

use crate::model::Tags;

/// Errors raised while converting between GeoJSON text and `geo` values.
#[derive(Debug, Error)]
pub enum GeoJsonError {
    /// The text could not be read as a GeoJSON geometry.
    #[error("failed to decode GeoJSON geometry")]
    Decode {
        /// Underlying reader error.
        #[source]
        source: GeozeroError,
    },
    /// The geometry could not be written.
    #[error("failed to encode geometry as GeoJSON")]
    Encode {
        /// Underlying writer error.
        #[source]
        source: GeozeroError,
    },
    /// The geometry decoded to an unexpected type.
    #[error("expected a {expected} geometry but found {found}")]
    UnexpectedKind {
        /// Requested geometry type.
        expected: &'static str,
        /// Decoded geometry type.
        found: &'static str,
    },
    /// The tag object was not a flat string map.
    #[error("failed to convert tags")]
    Tags {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Encode any geometry as a GeoJSON geometry object.
///
/// # Examples
/// ```
/// use geo::{Geometry, Point};
/// use cosm_core::geojson::{decode_point, encode_geometry};
///
/// let text = encode_geometry(&Geometry::Point(Point::new(1.5, 2.0))).unwrap();
/// assert_eq!(decode_point(&text).unwrap(), Point::new(1.5, 2.0));
/// ```
pub fn encode_geometry(geometry: &Geometry<f64>) -> Result<String, GeoJsonError> {
    geometry
        .to_json()
        .map_err(|source| GeoJsonError::Encode { source })
}

/// Decode a GeoJSON geometry object.
pub fn decode_geometry(text: &str) -> Result<Geometry<f64>, GeoJsonError> {
    geozero::geojson::GeoJson(text)
        .to_geo()
        .map_err(|source| GeoJsonError::Decode { source })
}

/// Decode a GeoJSON `Point`.
pub fn decode_point(text: &str) -> Result<Point<f64>, GeoJsonError> {
    match decode_geometry(text)? {
        Geometry::Point(point) => Ok(point),
        other => Err(unexpected("Point", &other)),
    }
}

/// Decode a GeoJSON `LineString`.
pub fn decode_line_string(text: &str) -> Result<LineString<f64>, GeoJsonError> {
    match decode_geometry(text)? {
        Geometry::LineString(line) => Ok(line),
        other => Err(unexpected("LineString", &other)),
    }
}

/// Decode a GeoJSON `Polygon` or `MultiPolygon` as a multi-polygon.
pub fn decode_multi_polygon(text: &str) -> Result<MultiPolygon<f64>, GeoJsonError> {
    match decode_geometry(text)? {
        Geometry::MultiPolygon(shape) => Ok(shape),
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        other => Err(unexpected("MultiPolygon", &other)),
    }
}

/// Encode tags as a flat JSON object.
pub fn encode_tags(tags: &Tags) -> Result<String, GeoJsonError> {
    serde_json::to_string(tags).map_err(|source| GeoJsonError::Tags { source })
}

/// Decode a flat JSON object of string tags.
///
/// # Examples
/// ```
/// use cosm_core::geojson::decode_tags;
///
/// let tags = decode_tags(r#"{"highway":"stop"}"#).unwrap();
/// assert_eq!(tags.get("highway").map(String::as_str), Some("stop"));
/// ```
pub fn decode_tags(text: &str) -> Result<Tags, GeoJsonError> {
    serde_json::from_str(text).map_err(|source| GeoJsonError::Tags { source })
}

fn unexpected(expected: &'static str, found: &Geometry<f64>) -> GeoJsonError {
    GeoJsonError::UnexpectedKind {
        expected,
        found: geometry_kind(found),
    }
}

const fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, coord};
    use rstest::rstest;

    #[rstest]
    fn decodes_literal_line_string() {
        let line = decode_line_string(r#"{"type":"LineString","coordinates":[[0,0],[1,0.5]]}"#)
            .expect("line decodes");
        assert_eq!(line, LineString::from(vec![(0.0, 0.0), (1.0, 0.5)]));
    }

    #[rstest]
    fn polygon_widens_to_multi_polygon() {
        let polygon = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }).to_polygon();
        let text = encode_geometry(&Geometry::Polygon(polygon.clone())).expect("encodes");
        let shape = decode_multi_polygon(&text).expect("decodes");
        assert_eq!(shape.0.len(), 1);
        assert_eq!(shape.0.first().map(|p| p.exterior().0.len()), Some(5));
    }

    #[rstest]
    fn reports_unexpected_geometry_kind() {
        let err = decode_point(r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#)
            .expect_err("kind mismatch");
        assert!(matches!(
            err,
            GeoJsonError::UnexpectedKind {
                expected: "Point",
                found: "LineString"
            }
        ));
    }

    #[rstest]
    fn rejects_garbage() {
        assert!(matches!(
            decode_geometry("not json"),
            Err(GeoJsonError::Decode { .. })
        ));
        assert!(matches!(
            decode_tags("[1,2]"),
            Err(GeoJsonError::Tags { .. })
        ));
    }
}
