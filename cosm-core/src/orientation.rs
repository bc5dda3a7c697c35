//! Bearing and travel-direction maths for placing annotations on a line.

use geo::{Bearing, Distance, Haversine, LineString, Point, Rhumb};

use crate::geometry::{NearestOnLine, bound_degrees};

/// Travel sense along a line relative to the way's vertex order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Direction {
    /// Along the vertex order.
    Forward,
    /// Against the vertex order.
    Backward,
}

impl Direction {
    /// OSM tag value for this direction.
    #[must_use]
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }

    /// Parse an OSM `direction` tag value; numeric angles are not directions.
    #[must_use]
    pub fn from_tag(value: &str) -> Option<Self> {
        match value {
            "forward" => Some(Self::Forward),
            "backward" => Some(Self::Backward),
            _ => None,
        }
    }
}

/// Where a direction choice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectionOrigin {
    /// Read from an existing `direction` tag.
    SpecifiedTag,
    /// Picked explicitly by the user.
    SpecifiedUser,
    /// Inferred from the nearest intersection.
    Inferred,
}

/// Direction choices gathered from every origin.
///
/// # Examples
/// ```
/// use cosm_core::orientation::{Direction, DirectionChoices, DirectionOrigin};
///
/// let mut choices = DirectionChoices::default();
/// assert_eq!(choices.resolved(), Direction::Forward);
/// choices.set(DirectionOrigin::Inferred, Some(Direction::Backward));
/// choices.set(DirectionOrigin::SpecifiedUser, Some(Direction::Forward));
/// assert_eq!(choices.resolved(), Direction::Forward);
/// choices.set(DirectionOrigin::SpecifiedUser, None);
/// assert_eq!(choices.resolved(), Direction::Backward);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionChoices {
    tag: Option<Direction>,
    user: Option<Direction>,
    inferred: Option<Direction>,
}

impl DirectionChoices {
    /// Learn or forget the direction from one origin.
    pub fn set(&mut self, origin: DirectionOrigin, direction: Option<Direction>) {
        match origin {
            DirectionOrigin::SpecifiedTag => self.tag = direction,
            DirectionOrigin::SpecifiedUser => self.user = direction,
            DirectionOrigin::Inferred => self.inferred = direction,
        }
    }

    /// Effective direction: tag, then user, then inferred, then forward.
    #[must_use]
    pub fn resolved(&self) -> Direction {
        self.tag
            .or(self.user)
            .or(self.inferred)
            .unwrap_or(Direction::Forward)
    }
}

/// Resolve a direction from optional tag, user and inferred choices.
#[must_use]
pub fn resolve_direction(
    tagged: Option<Direction>,
    user: Option<Direction>,
    inferred: Option<Direction>,
) -> Direction {
    let mut choices = DirectionChoices::default();
    choices.set(DirectionOrigin::SpecifiedTag, tagged);
    choices.set(DirectionOrigin::SpecifiedUser, user);
    choices.set(DirectionOrigin::Inferred, inferred);
    choices.resolved()
}

/// Bearing and inferred direction at a placement point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Orientation {
    /// Compass bearing of the centreline, degrees `[0, 360)`.
    pub bearing_deg: f64,
    /// Local sense, `None` when the line has no intersections.
    pub direction: Option<Direction>,
}

/// Bearing of `centreline` at vertex `index`, measured towards the adjacent
/// vertex.
///
/// Uses the following vertex when one exists, otherwise the preceding one,
/// and always measures from the lower to the higher index.
#[must_use]
pub fn angle_at_index(centreline: &LineString<f64>, index: usize) -> Option<f64> {
    let coords = &centreline.0;
    if index >= coords.len() {
        return None;
    }
    let other = if index + 1 >= coords.len() {
        index.checked_sub(1)?
    } else {
        index + 1
    };
    let prev = coords.get(index.min(other))?;
    let next = coords.get(index.max(other))?;
    Some(bound_degrees(Rhumb.bearing(Point(*prev), Point(*next))))
}

/// Classify the local sense of `centreline` at a placement point.
///
/// The first vertex is always [`Direction::Backward`] and the last always
/// [`Direction::Forward`]. Elsewhere the intersection vertex nearest the
/// placement point decides: lying ahead in vertex order means forward.
/// Lines without intersections have no inferred direction.
#[must_use]
pub fn direction_at(
    centreline: &LineString<f64>,
    nearest: &NearestOnLine,
    intersections: &[usize],
) -> Option<Direction> {
    if nearest.location_m <= 0.0 {
        return Some(Direction::Backward);
    }
    if nearest.index + 1 == centreline.0.len() {
        return Some(Direction::Forward);
    }
    let closest = intersections
        .iter()
        .filter_map(|ix| {
            centreline
                .0
                .get(*ix)
                .map(|coord| (*ix, Haversine.distance(Point(nearest.point), Point(*coord))))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    if nearest.index < closest.0 {
        Some(Direction::Forward)
    } else {
        Some(Direction::Backward)
    }
}

/// Bearing and direction together; `None` when the line has one vertex.
#[must_use]
pub fn angle_and_direction(
    centreline: &LineString<f64>,
    nearest: &NearestOnLine,
    intersections: &[usize],
) -> Option<Orientation> {
    let bearing_deg = angle_at_index(centreline, nearest.index)?;
    Some(Orientation {
        bearing_deg,
        direction: direction_at(centreline, nearest, intersections),
    })
}

/// Facing of a sign placed beside a way with bearing `way_bearing`.
///
/// # Examples
/// ```
/// use cosm_core::orientation::{Direction, sign_angle};
///
/// assert_eq!(sign_angle(90.0, Direction::Backward), 180.0);
/// assert_eq!(sign_angle(90.0, Direction::Forward), 0.0);
/// ```
#[must_use]
pub fn sign_angle(way_bearing: f64, direction: Direction) -> f64 {
    let orientation = match direction {
        Direction::Forward => 180.0,
        Direction::Backward => 0.0,
    };
    bound_degrees(way_bearing + 90.0 + orientation)
}

/// Value for a sign's `direction` tag: the facing turned around, whole
/// degrees.
///
/// # Examples
/// ```
/// use cosm_core::orientation::direction_tag;
///
/// assert_eq!(direction_tag(0.0), "180");
/// assert_eq!(direction_tag(270.4), "90");
/// ```
#[must_use]
pub fn direction_tag(angle: f64) -> String {
    format!("{:.0}", bound_degrees(angle + 180.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::nearest_point_on_line;
    use geo::Coord;
    use rstest::{fixture, rstest};

    #[fixture]
    fn straight_east() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)])
    }

    fn at_vertex(line: &LineString<f64>, index: usize) -> NearestOnLine {
        let coord = line.0.get(index).copied().expect("vertex exists");
        nearest_point_on_line(line, coord).expect("non-empty line")
    }

    #[rstest]
    #[case(0, 90.0)]
    #[case(1, 90.0)]
    #[case(2, 90.0)]
    fn angle_uses_adjacent_vertex(
        straight_east: LineString<f64>,
        #[case] index: usize,
        #[case] expected: f64,
    ) {
        let angle = angle_at_index(&straight_east, index).expect("angle defined");
        assert!((angle - expected).abs() < 1.0e-9);
    }

    #[rstest]
    #[case((0.0, 0.0), (0.0, 1.0), 0.0)]
    #[case((0.0, 1.0), (0.0, 0.0), 180.0)]
    #[case((1.0, 0.0), (0.0, 0.0), 270.0)]
    #[case((179.5, 0.0), (-179.5, 0.0), 90.0)]
    fn angle_follows_compass_headings(
        #[case] from: (f64, f64),
        #[case] to: (f64, f64),
        #[case] expected: f64,
    ) {
        let line = LineString::from(vec![from, to]);
        let angle = angle_at_index(&line, 0).expect("angle defined");
        assert!((angle - expected).abs() < 1.0e-9, "expected {expected}, got {angle}");
    }

    #[rstest]
    fn angle_is_undefined_for_single_vertex() {
        let line = LineString::from(vec![(0.0, 0.0)]);
        assert!(angle_at_index(&line, 0).is_none());
        assert!(angle_at_index(&line, 3).is_none());
    }

    #[rstest]
    fn intersection_ahead_means_forward(straight_east: LineString<f64>) {
        let nearest = at_vertex(&straight_east, 1);
        assert_eq!(nearest.index, 1);
        let orientation =
            angle_and_direction(&straight_east, &nearest, &[2]).expect("orientation defined");
        assert_eq!(orientation.direction, Some(Direction::Forward));
        assert!((orientation.bearing_deg - 90.0).abs() < 1.0e-9);
    }

    #[rstest]
    fn intersection_behind_means_backward() {
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
        let nearest = nearest_point_on_line(&line, Coord { x: 1.8, y: 0.0 }).expect("non-empty");
        assert_eq!(nearest.index, 1);
        assert_eq!(direction_at(&line, &nearest, &[0]), Some(Direction::Backward));
        assert_eq!(direction_at(&line, &nearest, &[3]), Some(Direction::Forward));
    }

    #[rstest]
    fn endpoints_ignore_intersections(straight_east: LineString<f64>) {
        let first = at_vertex(&straight_east, 0);
        let last = at_vertex(&straight_east, 2);
        assert_eq!(direction_at(&straight_east, &first, &[1]), Some(Direction::Backward));
        assert_eq!(direction_at(&straight_east, &last, &[1]), Some(Direction::Forward));
    }

    #[rstest]
    fn no_intersections_leave_direction_undefined(straight_east: LineString<f64>) {
        let middle = at_vertex(&straight_east, 1);
        assert_eq!(direction_at(&straight_east, &middle, &[]), None);
    }

    #[rstest]
    #[case(Some(Direction::Backward), Some(Direction::Forward), None, Direction::Backward)]
    #[case(None, Some(Direction::Backward), Some(Direction::Forward), Direction::Backward)]
    #[case(None, None, Some(Direction::Backward), Direction::Backward)]
    #[case(None, None, None, Direction::Forward)]
    fn resolves_direction_by_precedence(
        #[case] tag: Option<Direction>,
        #[case] user: Option<Direction>,
        #[case] inferred: Option<Direction>,
        #[case] expected: Direction,
    ) {
        let mut choices = DirectionChoices::default();
        choices.set(DirectionOrigin::SpecifiedTag, tag);
        choices.set(DirectionOrigin::SpecifiedUser, user);
        choices.set(DirectionOrigin::Inferred, inferred);
        assert_eq!(choices.resolved(), expected);
    }

    #[rstest]
    #[case("forward", Some(Direction::Forward))]
    #[case("backward", Some(Direction::Backward))]
    #[case("90", None)]
    fn parses_direction_tags(#[case] value: &str, #[case] expected: Option<Direction>) {
        assert_eq!(Direction::from_tag(value), expected);
    }
}
