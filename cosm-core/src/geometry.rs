//! Angle normalisation and centreline projection helpers.
//!
//! Distances come from `geo`'s haversine metric space on a spherical Earth.
//! Projections onto a centreline are solved in a local equirectangular plane
//! around the query point and then measured with haversine, so every
//! comparison inside one query shares one metric.

use std::f64::consts::PI;

use geo::{Coord, Distance, Haversine, LineString, MultiPolygon, Point, Polygon};

/// Mean Earth radius in metres, matching `geo`'s haversine metric space.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

fn haversine_m(from: Coord<f64>, to: Coord<f64>) -> f64 {
    Haversine.distance(Point(from), Point(to))
}

/// Normalise an angle in degrees into `[0, 360)`.
///
/// # Examples
/// ```
/// use cosm_core::geometry::bound_degrees;
///
/// assert_eq!(bound_degrees(370.0), 10.0);
/// assert_eq!(bound_degrees(-90.0), 270.0);
/// assert_eq!(bound_degrees(360.0), 0.0);
/// ```
#[must_use]
pub fn bound_degrees(value: f64) -> f64 {
    let bounded = value.rem_euclid(360.0);
    // `rem_euclid` rounds tiny negative inputs up to exactly 360.
    if bounded >= 360.0 { 0.0 } else { bounded }
}

/// Local equirectangular plane in metres centred on an origin coordinate.
///
/// Accurate for the few-hundred-metre spans used by hit-testing and
/// buffering; not intended for continental geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPlane {
    origin: Coord<f64>,
    metres_per_deg_lon: f64,
    metres_per_deg_lat: f64,
}

impl LocalPlane {
    /// Plane tangent at `origin`.
    #[must_use]
    pub fn new(origin: Coord<f64>) -> Self {
        let metres_per_deg_lat = EARTH_RADIUS_M * PI / 180.0;
        Self {
            origin,
            metres_per_deg_lon: metres_per_deg_lat * origin.y.to_radians().cos(),
            metres_per_deg_lat,
        }
    }

    /// Project lon/lat into plane metres.
    #[must_use]
    pub fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (coord.x - self.origin.x) * self.metres_per_deg_lon,
            y: (coord.y - self.origin.y) * self.metres_per_deg_lat,
        }
    }

    /// Map plane metres back to lon/lat.
    #[must_use]
    pub fn unproject(&self, coord: Coord<f64>) -> Coord<f64> {
        let lon_scale = if self.metres_per_deg_lon.abs() < f64::EPSILON {
            f64::EPSILON
        } else {
            self.metres_per_deg_lon
        };
        Coord {
            x: self.origin.x + coord.x / lon_scale,
            y: self.origin.y + coord.y / self.metres_per_deg_lat,
        }
    }

    /// Project every vertex of a line string.
    #[must_use]
    pub fn project_line(&self, line: &LineString<f64>) -> LineString<f64> {
        line.coords().map(|c| self.project(*c)).collect()
    }

    /// Map every vertex of a multi-polygon back to lon/lat.
    #[must_use]
    pub fn unproject_multi_polygon(&self, shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        shape
            .iter()
            .map(|polygon| {
                Polygon::new(
                    polygon
                        .exterior()
                        .coords()
                        .map(|c| self.unproject(*c))
                        .collect(),
                    polygon
                        .interiors()
                        .iter()
                        .map(|ring| ring.coords().map(|c| self.unproject(*c)).collect())
                        .collect(),
                )
            })
            .collect()
    }
}

/// The point on a centreline closest to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NearestOnLine {
    /// Closest position on the centreline.
    pub point: Coord<f64>,
    /// Haversine distance from the query point, in metres.
    pub distance_m: f64,
    /// Vertex index: the vertex itself when the projection lands on one,
    /// otherwise the first vertex of the containing segment.
    pub index: usize,
    /// Arc length from the first vertex to `point`, in metres.
    pub location_m: f64,
}

/// Project `point` onto `line`.
///
/// Returns `None` for an empty line. Ties keep the earliest segment.
///
/// # Examples
/// ```
/// use geo::{Coord, LineString};
/// use cosm_core::geometry::nearest_point_on_line;
///
/// let line = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
/// let nearest = nearest_point_on_line(&line, Coord { x: 1.5, y: 0.001 }).unwrap();
/// assert_eq!(nearest.index, 1);
/// assert!((nearest.point.x - 1.5).abs() < 1.0e-9);
/// ```
#[must_use]
pub fn nearest_point_on_line(line: &LineString<f64>, point: Coord<f64>) -> Option<NearestOnLine> {
    let plane = LocalPlane::new(point);
    let mut vertices = line.coords();
    let first = *vertices.next()?;

    let mut best = NearestOnLine {
        point: first,
        distance_m: haversine_m(point, first),
        index: 0,
        location_m: 0.0,
    };
    let mut travelled = 0.0;
    let mut start = first;

    for (segment, end) in vertices.enumerate() {
        let end = *end;
        let segment_length = haversine_m(start, end);
        let (candidate, t) = project_onto_segment(&plane, start, end);
        let (index, location_m) = if t <= 0.0 {
            (segment, travelled)
        } else if t >= 1.0 {
            (segment + 1, travelled + segment_length)
        } else {
            (segment, travelled + haversine_m(start, candidate))
        };
        let distance_m = haversine_m(point, candidate);
        if distance_m < best.distance_m {
            best = NearestOnLine {
                point: candidate,
                distance_m,
                index,
                location_m,
            };
        }
        travelled += segment_length;
        start = end;
    }

    Some(best)
}

/// Closest point on segment `a..b` to the plane origin and its parameter.
fn project_onto_segment(plane: &LocalPlane, a: Coord<f64>, b: Coord<f64>) -> (Coord<f64>, f64) {
    let pa = plane.project(a);
    let pb = plane.project(b);
    let dx = pb.x - pa.x;
    let dy = pb.y - pa.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f64::EPSILON {
        return (a, 0.0);
    }
    // The query point is the plane origin, so `p - a` is `-pa`.
    let t = ((-pa.x) * dx + (-pa.y) * dy) / length_sq;
    if t <= 0.0 {
        (a, 0.0)
    } else if t >= 1.0 {
        (b, 1.0)
    } else {
        let projected = Coord {
            x: pa.x + t * dx,
            y: pa.y + t * dy,
        };
        (plane.unproject(projected), t)
    }
}
