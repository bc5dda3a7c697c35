//! Errors surfaced by the replica engine.

use std::sync::Arc;

use cosm_core::{FeatureId, FetchError, GeoJsonError, StoreError};
use thiserror::Error;

/// Errors raised by replica operations.
///
/// Variants share their sources behind `Arc` so one failure can be handed to
/// every caller waiting on the same in-flight operation.
#[derive(Debug, Clone, Error)]
pub enum ReplicaError {
    /// The remote feature source failed.
    #[error("remote fetch failed: {0}")]
    Fetch(#[source] Arc<FetchError>),
    /// A spatial store statement failed.
    #[error("spatial store failed: {0}")]
    Store(#[source] Arc<StoreError>),
    /// An operation ran before a spatial store was attached, or after it was
    /// released.
    #[error("`{operation}` needs an attached spatial store")]
    StaleStatement {
        /// Operation that was attempted.
        operation: &'static str,
    },
    /// A spatial store is already attached.
    #[error("a spatial store is already attached")]
    AlreadyAttached,
    /// The derived-geometry maintainer stopped before reporting back.
    #[error("derived geometry maintainer has stopped")]
    MaintainerStopped,
    /// The line is not stored, or has no centreline yet.
    #[error("line {id} has no stored centreline")]
    UnknownLine {
        /// Requested line.
        id: FeatureId,
    },
    /// The line has too few vertices to have a bearing.
    #[error("line {id} has fewer than two vertices")]
    DegenerateLine {
        /// Requested line.
        id: FeatureId,
    },
}

impl From<FetchError> for ReplicaError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(Arc::new(err))
    }
}

impl From<StoreError> for ReplicaError {
    fn from(err: StoreError) -> Self {
        Self::Store(Arc::new(err))
    }
}

impl From<GeoJsonError> for ReplicaError {
    fn from(err: GeoJsonError) -> Self {
        Self::Store(Arc::new(StoreError::from(err)))
    }
}
