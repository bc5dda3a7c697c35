//! Command-line interface for the cosm spatial replica.
//!
//! Every sub-command opens the replica database, runs one engine operation
//! and prints the result as JSON on stdout. Options layer CLI flags over
//! `COSM_CMDS_<COMMAND>_<FIELD>` environment variables and configuration
//! files.
#![forbid(unsafe_code)]

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use cosm_core::{BBoxArg, FeatureSource};
use cosm_data::{OsmApiSource, SqliteSpatialStore, StoreOptions};
use cosm_replica::{Replica, ReplicaConfig, SyncConfig};
use geo::Rect;
use log::debug;
use serde_json::Value;

mod error;
mod output;
mod query;
mod sync;

pub use error::CliError;

use query::{NearestArgs, OrientArgs, TargetsArgs};
use sync::{RenderArgs, SyncArgs};

pub(crate) const ARG_BBOX: &str = "bbox";
pub(crate) const ARG_DB: &str = "db";
pub(crate) const ARG_API_URL: &str = "api-url";
pub(crate) const ARG_MAX_AREA: &str = "max-area";
pub(crate) const ARG_LON: &str = "lon";
pub(crate) const ARG_LAT: &str = "lat";
pub(crate) const ARG_LIMIT: &str = "limit";
pub(crate) const ARG_SIGN: &str = "sign";
pub(crate) const ARG_LINE: &str = "line";
pub(crate) const ARG_DIRECTION: &str = "direction";

pub(crate) const ENV_SYNC_BBOX: &str = "COSM_CMDS_SYNC_BBOX";
pub(crate) const ENV_RENDER_BBOX: &str = "COSM_CMDS_RENDER_BBOX";
pub(crate) const ENV_NEAREST_LON: &str = "COSM_CMDS_NEAREST_LON";
pub(crate) const ENV_NEAREST_LAT: &str = "COSM_CMDS_NEAREST_LAT";
pub(crate) const ENV_TARGETS_SIGN: &str = "COSM_CMDS_TARGETS_SIGN";
pub(crate) const ENV_TARGETS_BBOX: &str = "COSM_CMDS_TARGETS_BBOX";
pub(crate) const ENV_ORIENT_LON: &str = "COSM_CMDS_ORIENT_LON";
pub(crate) const ENV_ORIENT_LAT: &str = "COSM_CMDS_ORIENT_LAT";

/// Replica database used when `--db` is not given.
pub const DEFAULT_DB: &str = "cosm.db";

/// Run the cosm CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_with(cli.command, &OsmSourceBuilder, &mut stdout)
}

pub(crate) fn run_with(
    command: Command,
    sources: &dyn SourceBuilder,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let payload = runtime.block_on(dispatch(command, sources))?;
    write_json(writer, &payload)
}

async fn dispatch(command: Command, sources: &dyn SourceBuilder) -> Result<Value, CliError> {
    match command {
        Command::Sync(args) => sync::run_sync(args.into_config()?, sources).await,
        Command::Render(args) => sync::run_render(args.into_config()?, sources).await,
        Command::Nearest(args) => query::run_nearest(args.into_config()?, sources).await,
        Command::Targets(args) => query::run_targets(args.into_config()?, sources).await,
        Command::Orient(args) => query::run_orient(args.into_config()?, sources).await,
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "cosm",
    about = "Maintain and query a local replica of OpenStreetMap roads and signs",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Fetch whatever part of a bounding box is not stored yet.
    Sync(SyncArgs),
    /// Print stored features around a bounding box.
    Render(RenderArgs),
    /// Print the lines nearest a point.
    Nearest(NearestArgs),
    /// Print existing anchor nodes for a sign.
    Targets(TargetsArgs),
    /// Print the bearing and direction of a line at a point.
    Orient(OrientArgs),
}

/// Builds the remote feature source for one invocation.
pub(crate) trait SourceBuilder {
    fn build(&self, base_url: &str) -> Result<Arc<dyn FeatureSource>, CliError>;
}

pub(crate) struct OsmSourceBuilder;

impl SourceBuilder for OsmSourceBuilder {
    fn build(&self, base_url: &str) -> Result<Arc<dyn FeatureSource>, CliError> {
        let source = OsmApiSource::new(base_url).map_err(|source| CliError::BuildSource {
            base_url: base_url.to_owned(),
            source,
        })?;
        Ok(Arc::new(source))
    }
}

/// Open the replica database and attach it to a fresh engine.
pub(crate) fn open_replica(
    db: &Utf8Path,
    api_url: &str,
    sync: SyncConfig,
    sources: &dyn SourceBuilder,
) -> Result<Replica, CliError> {
    let source = sources.build(api_url)?;
    let replica = Replica::new(source, ReplicaConfig::default().with_sync(sync));
    let store =
        SqliteSpatialStore::open(db, StoreOptions::default()).map_err(|source| {
            CliError::OpenStore {
                path: db.to_path_buf(),
                source,
            }
        })?;
    replica.attach(Arc::new(store))?;
    debug!("Opened replica database {db}");
    Ok(replica)
}

pub(crate) fn default_db() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DB)
}

pub(crate) fn default_api_url() -> String {
    cosm_data::osm::DEFAULT_BASE_URL.to_owned()
}

pub(crate) fn parse_bbox(field: &'static str, value: &str) -> Result<Rect<f64>, CliError> {
    value
        .parse::<BBoxArg>()
        .map(|bbox| bbox.0)
        .map_err(|source| CliError::InvalidBBox {
            field,
            value: value.to_owned(),
            source,
        })
}

fn write_json(writer: &mut dyn Write, payload: &Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(payload).map_err(CliError::SerialiseOutput)?;
    writer
        .write_all(text.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
mod tests;
