//! Width and casing derivation for stored lines.

use cosm_core::Tags;
use cosm_core::geometry::LocalPlane;
use geo::{Buffer, Centroid, LineString, MultiPolygon};

/// Lane width used when only a lane count is tagged, in metres.
pub(crate) const LANE_WIDTH_M: f64 = 3.5;

/// Estimate a carriageway width in metres from a line's tags.
///
/// An explicit `width` wins, then `lanes`, then the `highway` class.
pub(crate) fn estimate_width(tags: &Tags) -> f64 {
    if let Some(width) = tags.get("width").and_then(|w| parse_metres(w)) {
        return width;
    }
    if let Some(lanes) = tags
        .get("lanes")
        .and_then(|l| l.trim().parse::<u32>().ok())
        .filter(|l| *l > 0)
    {
        return f64::from(lanes) * LANE_WIDTH_M;
    }
    match tags.get("highway").map(String::as_str) {
        Some("motorway" | "trunk") => 14.0,
        Some("primary") => 12.0,
        Some("secondary") => 10.0,
        Some("tertiary") => 8.0,
        Some("residential" | "unclassified") => 7.0,
        Some("service") => 4.5,
        Some("footway" | "path" | "cycleway") => 2.5,
        _ => 6.0,
    }
}

// Accepts "7", "7.5", "7 m" and "7.5m"; anything else is ignored.
fn parse_metres(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let number = trimmed.strip_suffix('m').unwrap_or(trimmed).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite() && *w > 0.0)
}

/// Buffer `centreline` by half of `width_m` on each side.
///
/// The buffer is computed in a local plane centred on the line and mapped
/// back to lon/lat. Degenerate lines yield `None`.
pub(crate) fn casing(centreline: &LineString<f64>, width_m: f64) -> Option<MultiPolygon<f64>> {
    if centreline.0.len() < 2 || width_m <= 0.0 {
        return None;
    }
    let origin = centreline.centroid()?;
    let plane = LocalPlane::new(origin.0);
    let buffered = plane.project_line(centreline).buffer(width_m / 2.0);
    if buffered.0.is_empty() {
        return None;
    }
    Some(plane.unproject_multi_polygon(&buffered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains, Point};
    use rstest::rstest;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[rstest]
    #[case(&[("width", "9"), ("lanes", "4")], 9.0)]
    #[case(&[("width", "5.5 m")], 5.5)]
    #[case(&[("width", "wide"), ("lanes", "2")], 7.0)]
    #[case(&[("lanes", "3"), ("highway", "primary")], 10.5)]
    #[case(&[("highway", "motorway")], 14.0)]
    #[case(&[("highway", "residential")], 7.0)]
    #[case(&[("highway", "footway")], 2.5)]
    #[case(&[("highway", "bridleway")], 6.0)]
    #[case(&[], 6.0)]
    fn estimates_width_from_tags(#[case] pairs: &[(&str, &str)], #[case] expected: f64) {
        assert!((estimate_width(&tags(pairs)) - expected).abs() < 1.0e-9);
    }

    #[rstest]
    fn casing_surrounds_centreline() {
        let line = LineString::from(vec![(13.4, 52.5), (13.401, 52.5)]);
        let shape = casing(&line, 10.0).expect("casing computed");
        assert!(shape.unsigned_area() > 0.0);
        assert!(shape.contains(&Point::new(13.4005, 52.5)));
        assert!(!shape.contains(&Point::new(13.4005, 52.501)));
    }

    #[rstest]
    fn degenerate_line_has_no_casing() {
        let line = LineString::from(vec![(0.0, 0.0)]);
        assert!(casing(&line, 10.0).is_none());
    }
}
