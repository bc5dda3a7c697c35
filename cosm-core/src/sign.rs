//! Closed catalogue of traffic signs and the tags they imply.
//!
//! Every sign knows which existing feature it annotates ([`SignKind::wants`]),
//! which stretch of road it governs ([`SignKind::affects`]) and which tags a
//! new sign node carries ([`SignKind::tags`]).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::model::Tags;

/// Errors raised while parsing signs, distances or speeds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignParseError {
    /// The numeric part could not be read.
    #[error("{value:?} is not a valid number")]
    InvalidNumber {
        /// Offending text.
        value: String,
    },
    /// The unit suffix is not recognised.
    #[error("unknown unit {unit:?}")]
    UnknownUnit {
        /// Offending unit.
        unit: String,
    },
    /// The sign name is not in the catalogue.
    #[error("unknown sign {name:?}")]
    UnknownSign {
        /// Offending name.
        name: String,
    },
    /// The hazard name is not in the catalogue.
    #[error("unknown hazard {name:?}")]
    UnknownHazard {
        /// Offending name.
        name: String,
    },
    /// The sign needs an argument that was not supplied.
    #[error("sign {name:?} requires an argument")]
    MissingArgument {
        /// Sign name.
        name: String,
    },
}

/// Units accepted in a [`QualifiedDistance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceUnit {
    /// Metres, the implicit unit.
    Metres,
    /// Kilometres.
    Kilometres,
    /// Yards.
    Yards,
    /// Statute miles.
    Miles,
    /// Feet.
    Feet,
    /// Inches.
    Inches,
    /// Nautical miles.
    NauticalMiles,
}

impl DistanceUnit {
    fn suffix(self) -> &'static str {
        match self {
            Self::Metres => "m",
            Self::Kilometres => "km",
            Self::Yards => "yd",
            Self::Miles => "mi",
            Self::Feet => "ft",
            Self::Inches => "in",
            Self::NauticalMiles => "nmi",
        }
    }

    fn metres(self) -> f64 {
        match self {
            Self::Metres => 1.0,
            Self::Kilometres => 1_000.0,
            Self::Yards => 0.9144,
            Self::Miles => 1_609.344,
            Self::Feet => 0.3048,
            Self::Inches => 0.0254,
            Self::NauticalMiles => 1_852.0,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "" | "m" => Self::Metres,
            "km" => Self::Kilometres,
            "yd" => Self::Yards,
            "mi" => Self::Miles,
            "ft" => Self::Feet,
            "in" => Self::Inches,
            "nmi" => Self::NauticalMiles,
            _ => return None,
        })
    }
}

/// A distance written the way OSM tags write it: `150`, `0.2 mi`, `12'6"`.
///
/// # Examples
/// ```
/// use cosm_core::sign::QualifiedDistance;
///
/// let d: QualifiedDistance = "0.2 mi".parse().unwrap();
/// assert_eq!(d.to_string(), "0.2 mi");
/// assert!((d.to_metres() - 321.8688).abs() < 1.0e-9);
///
/// let bare: QualifiedDistance = "150".parse().unwrap();
/// assert_eq!(bare.to_string(), "150");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualifiedDistance {
    /// A number with a unit.
    Measured {
        /// Magnitude.
        value: f64,
        /// Unit.
        unit: DistanceUnit,
    },
    /// Imperial feet and inches, written `F'I"`.
    FeetInches {
        /// Whole feet.
        feet: u32,
        /// Whole inches.
        inches: u32,
    },
}

impl QualifiedDistance {
    /// Distance in metres.
    #[must_use]
    pub fn to_metres(&self) -> f64 {
        match self {
            Self::Measured { value, unit } => value * unit.metres(),
            Self::FeetInches { feet, inches } => {
                f64::from(*feet) * DistanceUnit::Feet.metres()
                    + f64::from(*inches) * DistanceUnit::Inches.metres()
            }
        }
    }
}

impl fmt::Display for QualifiedDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured {
                value,
                unit: DistanceUnit::Metres,
            } => write!(f, "{value}"),
            Self::Measured { value, unit } => write!(f, "{value} {}", unit.suffix()),
            Self::FeetInches { feet, inches } => write!(f, "{feet}'{inches}\""),
        }
    }
}

impl FromStr for QualifiedDistance {
    type Err = SignParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if let Some((feet, rest)) = text.split_once('\'') {
            let inches = rest.trim().trim_end_matches('"').trim();
            return Ok(Self::FeetInches {
                feet: parse_whole(feet)?,
                inches: if inches.is_empty() {
                    0
                } else {
                    parse_whole(inches)?
                },
            });
        }
        let (value, suffix) = split_measure(text)?;
        let unit = DistanceUnit::from_suffix(suffix).ok_or_else(|| SignParseError::UnknownUnit {
            unit: suffix.to_owned(),
        })?;
        Ok(Self::Measured { value, unit })
    }
}

/// Units accepted in a [`QualifiedSpeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeedUnit {
    /// Kilometres per hour, the implicit unit.
    KilometresPerHour,
    /// Miles per hour.
    MilesPerHour,
    /// Knots.
    Knots,
}

/// A speed written the way OSM `maxspeed` tags write it: `50`, `30 mph`.
///
/// # Examples
/// ```
/// use cosm_core::sign::QualifiedSpeed;
///
/// assert_eq!("50 km/h".parse::<QualifiedSpeed>().unwrap().to_string(), "50");
/// assert_eq!("30 mph".parse::<QualifiedSpeed>().unwrap().to_string(), "30 mph");
/// assert_eq!("5 kt".parse::<QualifiedSpeed>().unwrap().to_string(), "5 knots");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualifiedSpeed {
    /// Magnitude.
    pub value: f64,
    /// Unit.
    pub unit: SpeedUnit,
}

impl fmt::Display for QualifiedSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value;
        match self.unit {
            SpeedUnit::KilometresPerHour => write!(f, "{value}"),
            SpeedUnit::MilesPerHour => write!(f, "{value} mph"),
            SpeedUnit::Knots => write!(f, "{value} knots"),
        }
    }
}

impl FromStr for QualifiedSpeed {
    type Err = SignParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (value, suffix) = split_measure(text.trim())?;
        let unit = match suffix {
            "" | "km/h" | "kmh" => SpeedUnit::KilometresPerHour,
            "mph" => SpeedUnit::MilesPerHour,
            "kt" | "knots" => SpeedUnit::Knots,
            other => {
                return Err(SignParseError::UnknownUnit {
                    unit: other.to_owned(),
                });
            }
        };
        Ok(Self { value, unit })
    }
}

fn split_measure(text: &str) -> Result<(f64, &str), SignParseError> {
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(end);
    let value = number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| SignParseError::InvalidNumber {
            value: text.to_owned(),
        })?;
    Ok((value, suffix.trim()))
}

fn parse_whole(text: &str) -> Result<u32, SignParseError> {
    text.trim()
        .parse()
        .map_err(|_| SignParseError::InvalidNumber {
            value: text.to_owned(),
        })
}

/// Warning signs, each mapped onto OSM `hazard` tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardKind {
    /// Wild animals crossing.
    AnimalCrossing,
    /// Speed hump.
    Bump,
    /// Children.
    Children,
    /// Single curve.
    Curve,
    /// Hairpin curve.
    Hairpin,
    /// Loop curve.
    Loop,
    /// Double curve.
    Serpentine,
    /// Winding road.
    ExtendedCurves,
    /// Cyclists.
    Cyclists,
    /// Crossroads with priority.
    Crossroad,
    /// Side road with priority.
    Sideroad,
    /// Staggered crossroads with priority.
    StaggeredCrossroad,
}

impl HazardKind {
    /// Every hazard in catalogue order.
    pub const ALL: [Self; 12] = [
        Self::AnimalCrossing,
        Self::Bump,
        Self::Children,
        Self::Curve,
        Self::Hairpin,
        Self::Loop,
        Self::Serpentine,
        Self::ExtendedCurves,
        Self::Cyclists,
        Self::Crossroad,
        Self::Sideroad,
        Self::StaggeredCrossroad,
    ];

    /// Stable identifier used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AnimalCrossing => "animal_crossing",
            Self::Bump => "bump",
            Self::Children => "children",
            Self::Curve => "curve",
            Self::Hairpin => "hairpin",
            Self::Loop => "loop",
            Self::Serpentine => "serpentine",
            Self::ExtendedCurves => "extended_curves",
            Self::Cyclists => "cyclists",
            Self::Crossroad => "crossroad",
            Self::Sideroad => "sideroad",
            Self::StaggeredCrossroad => "staggered_crossroad",
        }
    }

    /// Tags describing the hazard on a sign node.
    #[must_use]
    pub fn tags(self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::AnimalCrossing => vec![("hazard", "animal_crossing")],
            Self::Bump => vec![("hazard", "bump")],
            Self::Children => vec![("hazard", "children")],
            Self::Curve => vec![("hazard", "curve")],
            Self::Hairpin => vec![("hazard", "curve"), ("curve", "hairpin")],
            Self::Loop => vec![("hazard", "curve"), ("curve", "loop")],
            Self::Serpentine => vec![("hazard", "curves"), ("curves", "serpentine")],
            Self::ExtendedCurves => vec![("hazard", "curves"), ("curves", "extended")],
            Self::Cyclists => vec![("hazard", "cyclists")],
            Self::Crossroad => vec![("hazard", "crossroad"), ("priority", "with_us")],
            Self::Sideroad => vec![("hazard", "sideroad"), ("priority", "with_us")],
            Self::StaggeredCrossroad => vec![
                ("hazard", "crossroad"),
                ("priority", "with_us"),
                ("staggered", "yes"),
            ],
        }
    }
}

impl FromStr for HazardKind {
    type Err = SignParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|hazard| hazard.name() == text)
            .ok_or_else(|| SignParseError::UnknownHazard {
                name: text.to_owned(),
            })
    }
}

/// An ordered conjunction of `key = value` tag clauses.
///
/// # Examples
/// ```
/// use cosm_core::{Tags, TagPredicate};
///
/// let predicate = TagPredicate::new().and("highway", "stop");
/// let mut tags = Tags::new();
/// tags.insert("highway".into(), "stop".into());
/// assert!(predicate.matches(&tags));
/// assert!(TagPredicate::new().matches(&Tags::new()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagPredicate {
    clauses: Vec<(String, String)>,
}

impl TagPredicate {
    /// The empty predicate, matching everything.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Add a clause.
    #[must_use]
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((key.into(), value.into()));
        self
    }

    /// Clauses in insertion order.
    #[must_use]
    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    /// Whether the predicate has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether every clause holds for `tags`.
    #[must_use]
    pub fn matches(&self, tags: &Tags) -> bool {
        self.clauses
            .iter()
            .all(|(key, value)| tags.get(key).is_some_and(|v| v == value))
    }
}

/// Feature kind a sign annotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// An existing point feature.
    Node,
    /// A line feature.
    Line,
}

/// What a sign wants to attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Node or line.
    pub kind: TargetKind,
    /// Tags the target should carry.
    pub predicate: TagPredicate,
    /// Tags commonly mapped in error where this sign stands.
    pub erroneous_alternative: Option<TagPredicate>,
}

/// Stretch of road a sign governs.
#[derive(Debug, Clone, PartialEq)]
pub enum Affects {
    /// The sign's own position.
    Point,
    /// The given distance beyond the sign.
    Next(QualifiedDistance),
    /// An unspecified stretch beyond the sign.
    Ahead,
    /// From the sign to the next sign that ends it.
    PointToPoint,
    /// The area the sign opens.
    Zone,
    /// Several of the above at once.
    Combined(Vec<Affects>),
}

/// The closed set of signs that can be placed.
///
/// Names follow `name[:argument]`; city limits take `name;speed`.
///
/// # Examples
/// ```
/// use cosm_core::sign::{SignKind, TargetKind};
///
/// let stop: SignKind = "stop".parse().unwrap();
/// assert_eq!(stop.traffic_sign(), "stop");
/// assert_eq!(stop.wants().kind, TargetKind::Node);
///
/// let limit: SignKind = "maxspeed:30 mph".parse().unwrap();
/// assert_eq!(limit.tags().get("maxspeed").map(String::as_str), Some("30 mph"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SignKind {
    /// Stop.
    Stop,
    /// Give way.
    GiveWay,
    /// Give way at a roundabout.
    Roundabout,
    /// Stop ahead, optionally at a distance.
    StopAhead {
        /// Distance printed on the sign.
        distance: Option<QualifiedDistance>,
    },
    /// Give way ahead, optionally at a distance.
    GiveWayAhead {
        /// Distance printed on the sign.
        distance: Option<QualifiedDistance>,
    },
    /// Traffic signals ahead, optionally at a distance.
    SignalsAhead {
        /// Distance printed on the sign.
        distance: Option<QualifiedDistance>,
    },
    /// Speed limit.
    MaxSpeed {
        /// Posted limit.
        speed: QualifiedSpeed,
    },
    /// Town entry, optionally with an implied limit.
    CityLimit {
        /// Town name.
        name: String,
        /// Implied limit, when printed.
        maxspeed: Option<QualifiedSpeed>,
    },
    /// Warning sign.
    Hazard(HazardKind),
}

impl SignKind {
    /// Value of the `traffic_sign` tag.
    #[must_use]
    pub const fn traffic_sign(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::GiveWay => "give_way",
            Self::Roundabout => "give_way,roundabout",
            Self::StopAhead { .. } => "stop_ahead",
            Self::GiveWayAhead { .. } => "yield_ahead",
            Self::SignalsAhead { .. } => "signal_ahead",
            Self::MaxSpeed { .. } => "maxspeed",
            Self::CityLimit { .. } => "maxspeed,city_limit",
            Self::Hazard(_) => "hazard",
        }
    }

    /// Feature this sign annotates.
    #[must_use]
    pub fn wants(&self) -> Target {
        let node = |key: &str, value: &str| Target {
            kind: TargetKind::Node,
            predicate: TagPredicate::new().and(key, value),
            erroneous_alternative: None,
        };
        let line = |speed: Option<&QualifiedSpeed>| Target {
            kind: TargetKind::Line,
            predicate: speed.map_or_else(TagPredicate::new, |s| {
                TagPredicate::new().and("maxspeed", s.to_string())
            }),
            erroneous_alternative: None,
        };
        match self {
            Self::Stop => Target {
                erroneous_alternative: Some(TagPredicate::new().and("highway", "give_way")),
                ..node("highway", "stop")
            },
            Self::GiveWay | Self::Roundabout | Self::GiveWayAhead { .. } => {
                node("highway", "give_way")
            }
            Self::StopAhead { .. } => node("highway", "stop"),
            Self::SignalsAhead { .. } => node("highway", "traffic_signals"),
            Self::MaxSpeed { speed } => line(Some(speed)),
            Self::CityLimit { maxspeed, .. } => line(maxspeed.as_ref()),
            Self::Hazard(_) => Target {
                kind: TargetKind::Node,
                predicate: TagPredicate::new(),
                erroneous_alternative: None,
            },
        }
    }

    /// Stretch of road this sign governs.
    #[must_use]
    pub fn affects(&self) -> Affects {
        match self {
            Self::Stop | Self::GiveWay | Self::Roundabout | Self::Hazard(_) => Affects::Point,
            Self::StopAhead { distance }
            | Self::GiveWayAhead { distance }
            | Self::SignalsAhead { distance } => {
                distance.map_or(Affects::Ahead, Affects::Next)
            }
            Self::MaxSpeed { .. } => Affects::PointToPoint,
            Self::CityLimit { .. } => Affects::Combined(vec![Affects::PointToPoint, Affects::Zone]),
        }
    }

    /// Tags for a new sign node, excluding its `direction`.
    #[must_use]
    pub fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert("traffic_sign".into(), self.traffic_sign().into());
        match self {
            Self::Stop | Self::GiveWay | Self::Roundabout => {}
            Self::StopAhead { distance }
            | Self::GiveWayAhead { distance }
            | Self::SignalsAhead { distance } => {
                if let Some(distance) = distance {
                    tags.insert("distance".into(), distance.to_string());
                }
            }
            Self::MaxSpeed { speed } => {
                tags.insert("maxspeed".into(), speed.to_string());
            }
            Self::CityLimit { name, maxspeed } => {
                tags.insert("name".into(), name.clone());
                tags.insert("city_limit".into(), "begin".into());
                if let Some(speed) = maxspeed {
                    tags.insert("maxspeed".into(), speed.to_string());
                }
            }
            Self::Hazard(hazard) => {
                for (key, value) in hazard.tags() {
                    tags.insert(key.into(), value.into());
                }
            }
        }
        tags
    }
}

impl FromStr for SignKind {
    type Err = SignParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (name, argument) = match text.trim().split_once(':') {
            Some((name, argument)) => (name.trim(), Some(argument.trim())),
            None => (text.trim(), None),
        };
        let argument = argument.filter(|a| !a.is_empty());
        let required = || {
            argument.ok_or_else(|| SignParseError::MissingArgument {
                name: name.to_owned(),
            })
        };
        let distance = || {
            argument
                .map(str::parse::<QualifiedDistance>)
                .transpose()
        };
        Ok(match name {
            "stop" => Self::Stop,
            "give_way" => Self::GiveWay,
            "roundabout" => Self::Roundabout,
            "stop_ahead" => Self::StopAhead {
                distance: distance()?,
            },
            "give_way_ahead" => Self::GiveWayAhead {
                distance: distance()?,
            },
            "signals_ahead" => Self::SignalsAhead {
                distance: distance()?,
            },
            "maxspeed" => Self::MaxSpeed {
                speed: required()?.parse()?,
            },
            "city_limit" => {
                let argument = required()?;
                let (town, speed) = match argument.split_once(';') {
                    Some((town, speed)) => (town.trim(), Some(speed.trim().parse()?)),
                    None => (argument, None),
                };
                Self::CityLimit {
                    name: town.to_owned(),
                    maxspeed: speed,
                }
            }
            "hazard" => Self::Hazard(required()?.parse()?),
            other => {
                return Err(SignParseError::UnknownSign {
                    name: other.to_owned(),
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("150", 150.0)]
    #[case("1.5 km", 1_500.0)]
    #[case("100 yd", 91.44)]
    #[case("6'0\"", 1.8288)]
    #[case("6'", 1.8288)]
    #[case("1 nmi", 1_852.0)]
    fn converts_distances_to_metres(#[case] text: &str, #[case] metres: f64) {
        let distance: QualifiedDistance = text.parse().expect("distance parses");
        assert!((distance.to_metres() - metres).abs() < 1.0e-9);
    }

    #[rstest]
    #[case("12 furlongs", SignParseError::UnknownUnit { unit: "furlongs".into() })]
    #[case("km", SignParseError::InvalidNumber { value: "km".into() })]
    fn rejects_bad_distances(#[case] text: &str, #[case] expected: SignParseError) {
        assert_eq!(text.parse::<QualifiedDistance>(), Err(expected));
    }

    #[rstest]
    #[case("stop", "highway", "stop")]
    #[case("give_way", "highway", "give_way")]
    #[case("roundabout", "highway", "give_way")]
    #[case("give_way_ahead", "highway", "give_way")]
    #[case("stop_ahead:100", "highway", "stop")]
    #[case("signals_ahead", "highway", "traffic_signals")]
    fn node_signs_want_matching_nodes(
        #[case] sign: &str,
        #[case] key: &str,
        #[case] value: &str,
    ) {
        let sign: SignKind = sign.parse().expect("sign parses");
        let target = sign.wants();
        assert_eq!(target.kind, TargetKind::Node);
        assert_eq!(target.predicate, TagPredicate::new().and(key, value));
    }

    #[rstest]
    fn stop_lists_give_way_as_erroneous_alternative() {
        let target = SignKind::Stop.wants();
        assert_eq!(
            target.erroneous_alternative,
            Some(TagPredicate::new().and("highway", "give_way"))
        );
    }

    #[rstest]
    fn speed_signs_want_lines() {
        let limit: SignKind = "maxspeed:50".parse().expect("sign parses");
        let target = limit.wants();
        assert_eq!(target.kind, TargetKind::Line);
        assert_eq!(target.predicate, TagPredicate::new().and("maxspeed", "50"));

        let town: SignKind = "city_limit:Springfield".parse().expect("sign parses");
        assert!(town.wants().predicate.is_empty());
    }

    #[rstest]
    fn ahead_signs_affect_their_distance() {
        let sign: SignKind = "stop_ahead:200 m".parse().expect("sign parses");
        assert!(matches!(sign.affects(), Affects::Next(d) if (d.to_metres() - 200.0).abs() < 1e-9));
        let sign: SignKind = "stop_ahead".parse().expect("sign parses");
        assert_eq!(sign.affects(), Affects::Ahead);
    }

    #[rstest]
    fn city_limit_carries_name_and_speed() {
        let sign: SignKind = "city_limit:Springfield;30 mph".parse().expect("sign parses");
        let tags = sign.tags();
        assert_eq!(tags.get("traffic_sign").map(String::as_str), Some("maxspeed,city_limit"));
        assert_eq!(tags.get("name").map(String::as_str), Some("Springfield"));
        assert_eq!(tags.get("city_limit").map(String::as_str), Some("begin"));
        assert_eq!(tags.get("maxspeed").map(String::as_str), Some("30 mph"));
        assert_eq!(
            sign.affects(),
            Affects::Combined(vec![Affects::PointToPoint, Affects::Zone])
        );
    }

    #[rstest]
    fn hazards_expand_to_detail_tags() {
        let sign: SignKind = "hazard:hairpin".parse().expect("sign parses");
        let tags = sign.tags();
        assert_eq!(tags.get("hazard").map(String::as_str), Some("curve"));
        assert_eq!(tags.get("curve").map(String::as_str), Some("hairpin"));
        assert_eq!(sign.affects(), Affects::Point);
    }

    #[rstest]
    #[case("maxspeed", SignParseError::MissingArgument { name: "maxspeed".into() })]
    #[case("hazard:meteor", SignParseError::UnknownHazard { name: "meteor".into() })]
    #[case("no_entry", SignParseError::UnknownSign { name: "no_entry".into() })]
    fn rejects_bad_signs(#[case] text: &str, #[case] expected: SignParseError) {
        assert_eq!(text.parse::<SignKind>(), Err(expected));
    }

    #[rstest]
    fn hazard_names_round_trip() {
        for hazard in HazardKind::ALL {
            assert_eq!(hazard.name().parse::<HazardKind>(), Ok(hazard));
        }
    }
}
