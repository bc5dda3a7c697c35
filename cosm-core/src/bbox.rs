//! Bounding-box helpers shared by the tracker, orchestrator and queries.
//!
//! Boxes are `geo::Rect` values in lon/lat degrees. `Rect::new` normalises
//! corners, so `min <= max` holds on both axes everywhere in this module.

use std::fmt;
use std::str::FromStr;

use geo::{Coord, Rect};
use thiserror::Error;

/// Quantisation step used to normalise viewport keys, in degrees.
pub const VIEWPORT_KEY_STEP: f64 = 1.0e-7;

/// Build a rectangle from `minlon, minlat, maxlon, maxlat`.
///
/// # Examples
/// ```
/// use cosm_core::bbox::rect;
///
/// let r = rect(0.0, 0.0, 10.0, 5.0);
/// assert_eq!(r.width(), 10.0);
/// assert_eq!(r.height(), 5.0);
/// ```
#[must_use]
pub fn rect(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: min_lon,
            y: min_lat,
        },
        Coord {
            x: max_lon,
            y: max_lat,
        },
    )
}

/// Push every side of `bbox` outward by the box's own extent.
///
/// The result keeps the same centre with twice the half-width and
/// half-height, so panning inside the margin does not need a new query.
///
/// # Examples
/// ```
/// use cosm_core::bbox::{double_pad, rect};
///
/// assert_eq!(double_pad(&rect(0.0, 0.0, 10.0, 10.0)), rect(-10.0, -10.0, 20.0, 20.0));
/// ```
#[must_use]
pub fn double_pad(bbox: &Rect<f64>) -> Rect<f64> {
    let width = bbox.width();
    let height = bbox.height();
    rect(
        bbox.min().x - width,
        bbox.min().y - height,
        bbox.max().x + width,
        bbox.max().y + height,
    )
}

/// Area of `bbox` in square degrees.
#[must_use]
pub fn area_deg2(bbox: &Rect<f64>) -> f64 {
    bbox.width() * bbox.height()
}

/// Render `bbox` as the `minlon,minlat,maxlon,maxlat` query parameter.
///
/// # Examples
/// ```
/// use cosm_core::bbox::{bbox_param, rect};
///
/// assert_eq!(bbox_param(&rect(-0.5, 51.0, 0.25, 51.5)), "-0.5,51,0.25,51.5");
/// ```
#[must_use]
pub fn bbox_param(bbox: &Rect<f64>) -> String {
    format!(
        "{},{},{},{}",
        bbox.min().x,
        bbox.min().y,
        bbox.max().x,
        bbox.max().y
    )
}

/// Errors raised when parsing a textual bounding box.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BBoxParseError {
    /// The text did not contain exactly four comma-separated values.
    #[error("expected minlon,minlat,maxlon,maxlat but found {count} values")]
    WrongArity {
        /// Number of values found.
        count: usize,
    },
    /// One of the values was not a finite number.
    #[error("bounding box value {value:?} is not a finite number")]
    InvalidNumber {
        /// The offending value.
        value: String,
    },
}

/// A bounding box parsed from `minlon,minlat,maxlon,maxlat` text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBoxArg(pub Rect<f64>);

impl FromStr for BBoxArg {
    type Err = BBoxParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let values = text
            .split(',')
            .map(|part| {
                let trimmed = part.trim();
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| BBoxParseError::InvalidNumber {
                        value: trimmed.to_owned(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        match values.as_slice() {
            [min_lon, min_lat, max_lon, max_lat] => {
                Ok(Self(rect(*min_lon, *min_lat, *max_lon, *max_lat)))
            }
            other => Err(BBoxParseError::WrongArity { count: other.len() }),
        }
    }
}

impl fmt::Display for BBoxArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bbox_param(&self.0))
    }
}

/// Hashable key identifying a viewport for single-flight deduplication.
///
/// Corners are quantised to [`VIEWPORT_KEY_STEP`] so that viewports differing
/// only by floating-point noise share one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportKey([i64; 4]);

impl ViewportKey {
    /// Normalise `bbox` into a key.
    ///
    /// # Examples
    /// ```
    /// use cosm_core::bbox::{ViewportKey, rect};
    ///
    /// let a = ViewportKey::from_rect(&rect(0.0, 0.0, 1.0, 1.0));
    /// let b = ViewportKey::from_rect(&rect(1.0, 1.0, 0.000_000_001, 0.0));
    /// assert_eq!(a, b);
    /// ```
    #[must_use]
    pub fn from_rect(bbox: &Rect<f64>) -> Self {
        Self([
            quantise(bbox.min().x),
            quantise(bbox.min().y),
            quantise(bbox.max().x),
            quantise(bbox.max().y),
        ])
    }
}

// Lon/lat degrees divided by the step stay far inside `i64`.
fn quantise(value: f64) -> i64 {
    (value / VIEWPORT_KEY_STEP).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(rect(0.0, 0.0, 10.0, 10.0), rect(-10.0, -10.0, 20.0, 20.0))]
    #[case(rect(-1.0, 50.0, 1.0, 51.0), rect(-3.0, 49.0, 3.0, 52.0))]
    #[case(rect(2.0, 2.0, 2.0, 2.0), rect(2.0, 2.0, 2.0, 2.0))]
    fn double_pad_triples_extent(#[case] input: Rect<f64>, #[case] expected: Rect<f64>) {
        assert_eq!(double_pad(&input), expected);
    }

    #[rstest]
    #[case("0,0,1,1", rect(0.0, 0.0, 1.0, 1.0))]
    #[case(" -0.5, 51 ,0.25,51.5 ", rect(-0.5, 51.0, 0.25, 51.5))]
    fn parses_bbox_text(#[case] text: &str, #[case] expected: Rect<f64>) {
        let parsed: BBoxArg = text.parse().expect("bbox should parse");
        assert_eq!(parsed.0, expected);
    }

    #[rstest]
    #[case("0,0,1", BBoxParseError::WrongArity { count: 3 })]
    #[case("0,0,1,x", BBoxParseError::InvalidNumber { value: "x".into() })]
    #[case("0,0,1,inf", BBoxParseError::InvalidNumber { value: "inf".into() })]
    fn rejects_malformed_bbox_text(#[case] text: &str, #[case] expected: BBoxParseError) {
        assert_eq!(text.parse::<BBoxArg>(), Err(expected));
    }

    #[rstest]
    fn distinct_viewports_have_distinct_keys() {
        let a = ViewportKey::from_rect(&rect(0.0, 0.0, 1.0, 1.0));
        let b = ViewportKey::from_rect(&rect(0.0, 0.0, 1.0, 1.000_01));
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn padding_keeps_centre(
            min_lon in -170.0f64..170.0,
            min_lat in -80.0f64..80.0,
            width in 0.0f64..5.0,
            height in 0.0f64..5.0,
        ) {
            let input = rect(min_lon, min_lat, min_lon + width, min_lat + height);
            let padded = double_pad(&input);
            prop_assert!((padded.center().x - input.center().x).abs() < 1.0e-9);
            prop_assert!((padded.center().y - input.center().y).abs() < 1.0e-9);
            prop_assert!((padded.width() - 3.0 * input.width()).abs() < 1.0e-9);
            prop_assert!((padded.height() - 3.0 * input.height()).abs() < 1.0e-9);
        }
    }
}
