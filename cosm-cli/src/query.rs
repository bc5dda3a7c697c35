//! `nearest`, `targets` and `orient` commands: interactive queries against
//! the stored replica.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use cosm_core::{Direction, FeatureId, SignKind, TargetKind};
use cosm_replica::{DEFAULT_NEAREST_LIMIT, NearestLine, Replica, SyncConfig};
use geo::{Coord, Rect};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    ARG_BBOX, ARG_DB, ARG_DIRECTION, ARG_LAT, ARG_LIMIT, ARG_LINE, ARG_LON, ARG_SIGN, CliError,
    ENV_NEAREST_LAT, ENV_NEAREST_LON, ENV_ORIENT_LAT, ENV_ORIENT_LON, ENV_TARGETS_BBOX,
    ENV_TARGETS_SIGN, SourceBuilder, default_api_url, default_db, open_replica, output,
    parse_bbox,
};

fn open_for_queries(db: &Utf8Path, sources: &dyn SourceBuilder) -> Result<Replica, CliError> {
    open_replica(db, &default_api_url(), SyncConfig::default(), sources)
}

fn required<T>(value: Option<T>, field: &'static str, env: &'static str) -> Result<T, CliError> {
    value.ok_or(CliError::MissingArgument { field, env })
}

fn parse_sign(value: &str) -> Result<SignKind, CliError> {
    value.parse().map_err(|source| CliError::InvalidSign {
        value: value.to_owned(),
        source,
    })
}

fn parse_direction(value: &str) -> Result<Direction, CliError> {
    Direction::from_tag(value.trim()).ok_or_else(|| CliError::InvalidDirection {
        value: value.to_owned(),
    })
}

/// CLI arguments for the `nearest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Print the stored lines nearest a point, closest first")]
#[ortho_config(prefix = "COSM")]
pub(crate) struct NearestArgs {
    /// Longitude of the query point.
    #[arg(long = ARG_LON, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
    /// Latitude of the query point.
    #[arg(long = ARG_LAT, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Number of lines to return (defaults to 5).
    #[arg(long = ARG_LIMIT, value_name = "n")]
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    /// Replica database path (defaults to `cosm.db`).
    #[arg(long = ARG_DB, value_name = "path")]
    #[serde(default)]
    pub(crate) db: Option<Utf8PathBuf>,
}

impl NearestArgs {
    pub(crate) fn into_config(self) -> Result<NearestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        NearestConfig::try_from(merged)
    }
}

/// Resolved `nearest` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NearestConfig {
    pub(crate) point: Coord<f64>,
    pub(crate) limit: usize,
    pub(crate) db: Utf8PathBuf,
}

impl TryFrom<NearestArgs> for NearestConfig {
    type Error = CliError;

    fn try_from(args: NearestArgs) -> Result<Self, Self::Error> {
        let lon = required(args.lon, ARG_LON, ENV_NEAREST_LON)?;
        let lat = required(args.lat, ARG_LAT, ENV_NEAREST_LAT)?;
        Ok(Self {
            point: Coord { x: lon, y: lat },
            limit: args.limit.unwrap_or(DEFAULT_NEAREST_LIMIT),
            db: args.db.unwrap_or_else(default_db),
        })
    }
}

pub(crate) async fn run_nearest(
    config: NearestConfig,
    sources: &dyn SourceBuilder,
) -> Result<Value, CliError> {
    let replica = open_for_queries(&config.db, sources)?;
    let lines = replica
        .queries()
        .nearest_lines(config.point, config.limit)
        .await;
    replica.shutdown().await?;
    let lines: Vec<Value> = lines?.iter().map(output::nearest_line).collect();
    Ok(json!({ "lines": lines }))
}

/// CLI arguments for the `targets` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "List stored nodes already tagged the way a sign wants, \
                  and nodes carrying a commonly mistaken tagging for it. \
                  Signs are written as `name` or `name:argument`, e.g. \
                  `stop`, `maxspeed:50 mph` or `hazard:ice`.",
    about = "List anchor nodes for a traffic sign"
)]
#[ortho_config(prefix = "COSM")]
pub(crate) struct TargetsArgs {
    /// Sign to place.
    #[arg(long = ARG_SIGN, value_name = "sign")]
    #[serde(default)]
    pub(crate) sign: Option<String>,
    /// Bounding box as `min_lon,min_lat,max_lon,max_lat`.
    #[arg(long = ARG_BBOX, value_name = "bbox", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bbox: Option<String>,
    /// Replica database path (defaults to `cosm.db`).
    #[arg(long = ARG_DB, value_name = "path")]
    #[serde(default)]
    pub(crate) db: Option<Utf8PathBuf>,
}

impl TargetsArgs {
    pub(crate) fn into_config(self) -> Result<TargetsConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        TargetsConfig::try_from(merged)
    }
}

/// Resolved `targets` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TargetsConfig {
    pub(crate) sign: SignKind,
    pub(crate) bbox: Rect<f64>,
    pub(crate) db: Utf8PathBuf,
}

impl TryFrom<TargetsArgs> for TargetsConfig {
    type Error = CliError;

    fn try_from(args: TargetsArgs) -> Result<Self, Self::Error> {
        let sign = required(args.sign, ARG_SIGN, ENV_TARGETS_SIGN)?;
        let bbox = required(args.bbox, ARG_BBOX, ENV_TARGETS_BBOX)?;
        Ok(Self {
            sign: parse_sign(&sign)?,
            bbox: parse_bbox(ARG_BBOX, &bbox)?,
            db: args.db.unwrap_or_else(default_db),
        })
    }
}

pub(crate) async fn run_targets(
    config: TargetsConfig,
    sources: &dyn SourceBuilder,
) -> Result<Value, CliError> {
    let replica = open_for_queries(&config.db, sources)?;
    let selection = replica
        .on_select_feature(&config.sign, &config.bbox)
        .await;
    replica.shutdown().await?;
    let selection = selection?;
    let target = match selection.target {
        TargetKind::Node => "node",
        TargetKind::Line => "line",
    };
    let candidates: Vec<Value> = selection.candidates.iter().map(output::target_node).collect();
    let erroneous: Vec<Value> = selection.erroneous.iter().map(output::target_node).collect();
    Ok(json!({
        "sign": config.sign.traffic_sign(),
        "target": target,
        "candidates": candidates,
        "erroneous": erroneous,
    }))
}

/// CLI arguments for the `orient` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Project a point onto a line and print the line's bearing \
                  and inferred travel direction there. Without --line the \
                  nearest stored line is used. With --sign the tags for a \
                  new sign at that point are printed as well.",
    about = "Print bearing, direction and sign placement on a line"
)]
#[ortho_config(prefix = "COSM")]
pub(crate) struct OrientArgs {
    /// Longitude of the placement point.
    #[arg(long = ARG_LON, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
    /// Latitude of the placement point.
    #[arg(long = ARG_LAT, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Line to project onto; defaults to the nearest stored line.
    #[arg(long = ARG_LINE, value_name = "id")]
    #[serde(default)]
    pub(crate) line: Option<FeatureId>,
    /// Sign to place at the projected point.
    #[arg(long = ARG_SIGN, value_name = "sign")]
    #[serde(default)]
    pub(crate) sign: Option<String>,
    /// `forward` or `backward`; overrides the inferred direction.
    #[arg(long = ARG_DIRECTION, value_name = "direction")]
    #[serde(default)]
    pub(crate) direction: Option<String>,
    /// Replica database path (defaults to `cosm.db`).
    #[arg(long = ARG_DB, value_name = "path")]
    #[serde(default)]
    pub(crate) db: Option<Utf8PathBuf>,
}

impl OrientArgs {
    pub(crate) fn into_config(self) -> Result<OrientConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        OrientConfig::try_from(merged)
    }
}

/// Resolved `orient` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrientConfig {
    pub(crate) point: Coord<f64>,
    pub(crate) line: Option<FeatureId>,
    pub(crate) sign: Option<SignKind>,
    pub(crate) direction: Option<Direction>,
    pub(crate) db: Utf8PathBuf,
}

impl TryFrom<OrientArgs> for OrientConfig {
    type Error = CliError;

    fn try_from(args: OrientArgs) -> Result<Self, Self::Error> {
        let lon = required(args.lon, ARG_LON, ENV_ORIENT_LON)?;
        let lat = required(args.lat, ARG_LAT, ENV_ORIENT_LAT)?;
        Ok(Self {
            point: Coord { x: lon, y: lat },
            line: args.line,
            sign: args.sign.as_deref().map(parse_sign).transpose()?,
            direction: args.direction.as_deref().map(parse_direction).transpose()?,
            db: args.db.unwrap_or_else(default_db),
        })
    }
}

pub(crate) async fn run_orient(
    config: OrientConfig,
    sources: &dyn SourceBuilder,
) -> Result<Value, CliError> {
    let replica = open_for_queries(&config.db, sources)?;
    let result = orient(&replica, &config).await;
    replica.shutdown().await?;
    result
}

async fn orient(replica: &Replica, config: &OrientConfig) -> Result<Value, CliError> {
    let line = match config.line {
        Some(line_id) => NearestLine {
            line_id,
            nearest: replica
                .queries()
                .project_onto_line(line_id, config.point)
                .await?,
        },
        None => {
            let tap = replica
                .on_tap_near(config.point)
                .await?
                .ok_or(CliError::NoLineNear {
                    lon: config.point.x,
                    lat: config.point.y,
                })?;
            tap.line
        }
    };
    let orientation = replica
        .queries()
        .angle_and_direction(line.line_id, &line.nearest)
        .await?;
    let derived = replica.queries().derived_point(line.line_id, &line.nearest);

    let mut payload = json!({
        "line": output::nearest_line(&line),
        "derived_id": derived.id,
        "bearing_deg": orientation.map(|o| o.bearing_deg),
        "direction": orientation.and_then(|o| o.direction).map(Direction::as_tag),
    });
    if let Some(sign) = &config.sign {
        let placement = replica
            .place_sign(sign, line.line_id, &line.nearest, config.direction)
            .await?;
        if let Value::Object(fields) = &mut payload {
            fields.insert(
                "placement".into(),
                json!({
                    "direction": placement.direction.as_tag(),
                    "sign_angle": placement.sign_angle,
                    "sign_tags": placement.sign_tags,
                    "marker_tags": placement.marker_tags,
                }),
            );
        }
    }
    Ok(payload)
}
