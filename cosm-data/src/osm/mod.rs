//! OSM API v0.6 adapter.
//!
//! [`OsmApiSource`] implements [`cosm_core::FeatureSource`] with one
//! `map.json` request per bounding box and decodes the response through
//! [`MapDocument`]. Relations are not replicated.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cosm_core::FeatureSource;
//! use cosm_core::bbox::rect;
//! use cosm_data::osm::{OsmApiConfig, OsmApiSource};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OsmApiConfig::default()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_user_agent("my-app/1.0");
//! let source = OsmApiSource::with_config(config)?;
//! let batch = source.fetch_bbox(&rect(13.40, 52.50, 13.41, 52.51)).await?;
//! println!("points: {}", batch.points.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod document;

pub use client::{
    DEFAULT_BASE_URL, DEFAULT_USER_AGENT, OsmApiConfig, OsmApiSource, SourceBuildError,
};
pub use document::{
    ApiLimits, CapabilitiesDocument, Element, MapDocument, Maximum, Seconds, SupportedVersions,
    VersionsDocument,
};
