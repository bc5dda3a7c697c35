//! The remote feature source collaborator.

use async_trait::async_trait;
use geo::Rect;
use thiserror::Error;

use crate::model::FeatureBatch;

/// Errors raised while fetching from a [`FeatureSource`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The source answered with a non-success status.
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },
    /// The source did not answer in time.
    #[error("request to {url} timed out after {timeout_secs} seconds")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The source could not be reached.
    #[error("network error calling {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport failure description.
        message: String,
    },
    /// The response could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder failure description.
        message: String,
    },
}

/// Bounded-box fetch endpoint for raw features.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Fetch every point and line inside `bbox` in one request.
    async fn fetch_bbox(&self, bbox: &Rect<f64>) -> Result<FeatureBatch, FetchError>;
}
