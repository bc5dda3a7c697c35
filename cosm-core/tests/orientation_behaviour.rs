//! Behavioural tests for orientation at a placement point.

use std::cell::RefCell;

use cosm_core::geometry::nearest_point_on_line;
use cosm_core::orientation::{
    Direction, Orientation, angle_and_direction, direction_tag, resolve_direction, sign_angle,
};
use geo::LineString;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

#[derive(Default)]
struct OrientationWorld {
    line: RefCell<Option<LineString<f64>>>,
    intersections: RefCell<Vec<usize>>,
    orientation: RefCell<Option<Orientation>>,
}

#[fixture]
fn world() -> OrientationWorld {
    OrientationWorld::default()
}

#[given("an eastbound line with three vertices")]
fn eastbound_line(world: &OrientationWorld) {
    world.line.replace(Some(LineString::from(vec![
        (0.0, 0.0),
        (1.0, 0.0),
        (2.0, 0.0),
    ])));
}

#[given("an intersection at vertex {index}")]
fn intersection_at(world: &OrientationWorld, index: usize) {
    world.intersections.borrow_mut().push(index);
}

#[when("I query the orientation at vertex {index}")]
fn query_orientation(world: &OrientationWorld, index: usize) {
    let line = world.line.borrow();
    let line = line.as_ref().expect("line should be set");
    let vertex = *line.0.get(index).expect("vertex should exist");
    let nearest = nearest_point_on_line(line, vertex).expect("line is not empty");
    let orientation = angle_and_direction(line, &nearest, &world.intersections.borrow());
    world.orientation.replace(orientation);
}

fn orientation(world: &OrientationWorld) -> Orientation {
    world
        .orientation
        .borrow()
        .expect("orientation should be defined")
}

#[then("the bearing is {degrees} degrees")]
fn bearing_is(world: &OrientationWorld, degrees: f64) {
    let actual = orientation(world).bearing_deg;
    assert!((actual - degrees).abs() < 1.0e-9, "bearing was {actual}");
}

#[then("the direction is forward")]
fn direction_forward(world: &OrientationWorld) {
    assert_eq!(orientation(world).direction, Some(Direction::Forward));
}

#[then("the direction is backward")]
fn direction_backward(world: &OrientationWorld) {
    assert_eq!(orientation(world).direction, Some(Direction::Backward));
}

#[then("no direction is inferred")]
fn no_direction(world: &OrientationWorld) {
    assert_eq!(orientation(world).direction, None);
}

#[then("the sign direction tag is {expected}")]
fn sign_direction_tag(world: &OrientationWorld, expected: String) {
    let found = orientation(world);
    let direction = resolve_direction(None, None, found.direction);
    let angle = sign_angle(found.bearing_deg, direction);
    assert_eq!(direction_tag(angle), expected);
}

#[scenario(path = "tests/features/orientation.feature", index = 0)]
fn intersection_ahead(world: OrientationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/orientation.feature", index = 1)]
fn first_vertex_backward(world: OrientationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/orientation.feature", index = 2)]
fn no_intersections(world: OrientationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/orientation.feature", index = 3)]
fn sign_facing_forward(world: OrientationWorld) {
    let _ = world;
}
