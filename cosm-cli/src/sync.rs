//! `sync` and `render` commands: filling and reading the replica.

use camino::Utf8PathBuf;
use clap::Parser;
use geo::Rect;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    ARG_API_URL, ARG_BBOX, ARG_DB, ARG_MAX_AREA, CliError, ENV_RENDER_BBOX, ENV_SYNC_BBOX,
    SourceBuilder, default_api_url, default_db, open_replica, output, parse_bbox,
};

/// CLI arguments for the `sync` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch the part of a bounding box that the replica has not \
                  stored yet, then bring derived line geometry up to date. \
                  Boxes already covered by earlier syncs cost no request.",
    about = "Fetch uncovered map data for a bounding box"
)]
#[ortho_config(prefix = "COSM")]
pub(crate) struct SyncArgs {
    /// Bounding box as `min_lon,min_lat,max_lon,max_lat`.
    #[arg(long = ARG_BBOX, value_name = "bbox", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bbox: Option<String>,
    /// Replica database path (defaults to `cosm.db`).
    #[arg(long = ARG_DB, value_name = "path")]
    #[serde(default)]
    pub(crate) db: Option<Utf8PathBuf>,
    /// Base URL of the OSM API.
    #[arg(long = ARG_API_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) api_url: Option<String>,
    /// Largest area the API serves per request, in square degrees. Enables
    /// the oversized-viewport guard.
    #[arg(long = ARG_MAX_AREA, value_name = "deg2")]
    #[serde(default)]
    pub(crate) max_area: Option<f64>,
}

impl SyncArgs {
    pub(crate) fn into_config(self) -> Result<SyncCommandConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SyncCommandConfig::try_from(merged)
    }
}

/// Resolved `sync` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncCommandConfig {
    pub(crate) bbox: Rect<f64>,
    pub(crate) db: Utf8PathBuf,
    pub(crate) api_url: String,
    pub(crate) max_area: Option<f64>,
}

impl SyncCommandConfig {
    fn replica_sync(&self) -> cosm_replica::SyncConfig {
        let sync = cosm_replica::SyncConfig::default();
        match self.max_area {
            Some(max_area) => sync.with_max_area(max_area),
            None => sync,
        }
    }
}

impl TryFrom<SyncArgs> for SyncCommandConfig {
    type Error = CliError;

    fn try_from(args: SyncArgs) -> Result<Self, Self::Error> {
        let bbox = args.bbox.ok_or(CliError::MissingArgument {
            field: ARG_BBOX,
            env: ENV_SYNC_BBOX,
        })?;
        Ok(Self {
            bbox: parse_bbox(ARG_BBOX, &bbox)?,
            db: args.db.unwrap_or_else(default_db),
            api_url: args.api_url.unwrap_or_else(default_api_url),
            max_area: args.max_area,
        })
    }
}

pub(crate) async fn run_sync(
    config: SyncCommandConfig,
    sources: &dyn SourceBuilder,
) -> Result<Value, CliError> {
    let replica = open_replica(&config.db, &config.api_url, config.replica_sync(), sources)?;
    let result = async {
        let outcome = replica.sync().ensure_covered(&config.bbox).await?;
        let derived = replica.recompute_derived_geometry().await?;
        Ok::<_, CliError>((outcome, derived))
    }
    .await;
    replica.shutdown().await?;
    let (outcome, derived) = result?;
    info!(
        "Sync finished after {} derived passes ({} rows changed)",
        derived.passes, derived.rows_changed
    );
    let mut payload = output::sync_outcome(&outcome);
    if let Value::Object(fields) = &mut payload {
        fields.insert(
            "derived".into(),
            json!({ "passes": derived.passes, "rows_changed": derived.rows_changed }),
        );
    }
    Ok(payload)
}

/// CLI arguments for the `render` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Print the stored points and lines around a bounding box \
                  as GeoJSON. The window is padded outward by the box's own \
                  extent on every side. Nothing is fetched.",
    about = "Print stored features around a bounding box"
)]
#[ortho_config(prefix = "COSM")]
pub(crate) struct RenderArgs {
    /// Bounding box as `min_lon,min_lat,max_lon,max_lat`.
    #[arg(long = ARG_BBOX, value_name = "bbox", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bbox: Option<String>,
    /// Replica database path (defaults to `cosm.db`).
    #[arg(long = ARG_DB, value_name = "path")]
    #[serde(default)]
    pub(crate) db: Option<Utf8PathBuf>,
}

impl RenderArgs {
    pub(crate) fn into_config(self) -> Result<RenderConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        RenderConfig::try_from(merged)
    }
}

/// Resolved `render` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderConfig {
    pub(crate) bbox: Rect<f64>,
    pub(crate) db: Utf8PathBuf,
}

impl TryFrom<RenderArgs> for RenderConfig {
    type Error = CliError;

    fn try_from(args: RenderArgs) -> Result<Self, Self::Error> {
        let bbox = args.bbox.ok_or(CliError::MissingArgument {
            field: ARG_BBOX,
            env: ENV_RENDER_BBOX,
        })?;
        Ok(Self {
            bbox: parse_bbox(ARG_BBOX, &bbox)?,
            db: args.db.unwrap_or_else(default_db),
        })
    }
}

pub(crate) async fn run_render(
    config: RenderConfig,
    sources: &dyn SourceBuilder,
) -> Result<Value, CliError> {
    let replica = open_replica(
        &config.db,
        &default_api_url(),
        cosm_replica::SyncConfig::default(),
        sources,
    )?;
    let render = replica.queries().features_in_viewport(&config.bbox).await;
    replica.shutdown().await?;
    let render = render?;
    Ok(json!({
        "window": output::bbox(&render.window),
        "points": output::feature_collection(&render.points)?,
        "lines": output::feature_collection(&render.lines)?,
    }))
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SyncCommandConfig, CliError> {
    let merged = SyncArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SyncCommandConfig::try_from(merged)
}
