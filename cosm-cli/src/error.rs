//! Error types emitted by the cosm CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use cosm_core::{BBoxParseError, SignParseError};
use cosm_data::{OpenStoreError, SourceBuildError};
use cosm_replica::ReplicaError;
use thiserror::Error;

/// Errors emitted by the cosm CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A bounding box did not parse.
    #[error("invalid --{field} value {value:?}: {source}")]
    InvalidBBox {
        field: &'static str,
        value: String,
        #[source]
        source: BBoxParseError,
    },
    /// A sign name did not parse.
    #[error("invalid --sign value {value:?}: {source}")]
    InvalidSign {
        value: String,
        #[source]
        source: SignParseError,
    },
    /// A direction was neither `forward` nor `backward`.
    #[error("invalid --direction value {value:?} (expected forward or backward)")]
    InvalidDirection { value: String },
    /// The async runtime could not start.
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Opening the replica database failed.
    #[error("failed to open replica database {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: OpenStoreError,
    },
    /// Constructing the OSM API client failed.
    #[error("failed to build OSM API client for {base_url:?}: {source}")]
    BuildSource {
        base_url: String,
        #[source]
        source: SourceBuildError,
    },
    /// A replica operation failed.
    #[error(transparent)]
    Replica(#[from] ReplicaError),
    /// No stored line is near the requested point.
    #[error("no stored line near {lon},{lat}")]
    NoLineNear { lon: f64, lat: f64 },
    /// Serialising command output failed.
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
