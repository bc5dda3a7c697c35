//! `FeatureSource` over the OSM API v0.6 map endpoint.

use std::time::Duration;

use async_trait::async_trait;
use cosm_core::bbox::bbox_param;
use cosm_core::{FeatureBatch, FeatureSource, FetchError};
use geo::Rect;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use super::document::{CapabilitiesDocument, MapDocument, VersionsDocument};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openstreetmap.org";

/// Default user agent for API requests.
pub const DEFAULT_USER_AGENT: &str = "cosm-replica/0.1";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while constructing an [`OsmApiSource`].
#[derive(Debug, Error)]
pub enum SourceBuildError {
    /// The configured base URL does not parse.
    #[error("invalid API base URL `{url}`")]
    InvalidBaseUrl {
        /// Rejected URL text.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// Configuration for [`OsmApiSource`].
#[derive(Debug, Clone)]
pub struct OsmApiConfig {
    /// API root, e.g. `"https://api.openstreetmap.org"`.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for OsmApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl OsmApiConfig {
    /// Create a configuration for the given API root.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Remote feature source backed by the OSM API.
///
/// One `map.json` request per bounding box; the server rejects boxes larger
/// than the area reported by [`OsmApiSource::capabilities`].
#[derive(Debug, Clone)]
pub struct OsmApiSource {
    client: Client,
    config: OsmApiConfig,
    base: Url,
}

impl OsmApiSource {
    /// Create a source with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client fails to
    /// build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceBuildError> {
        Self::with_config(OsmApiConfig::new(base_url))
    }

    /// Create a source with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client fails to
    /// build.
    pub fn with_config(config: OsmApiConfig) -> Result<Self, SourceBuildError> {
        let mut base = Url::parse(&config.base_url).map_err(|source| {
            SourceBuildError::InvalidBaseUrl {
                url: config.base_url.clone(),
                source,
            }
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(SourceBuildError::HttpClient)?;
        Ok(Self {
            client,
            config,
            base,
        })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &OsmApiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base.join(path).map_err(|err| FetchError::Network {
            url: format!("{}{path}", self.base),
            message: err.to_string(),
        })
    }

    /// URL of the map request for `bbox`.
    ///
    /// Format: `{base}/api/0.6/map.json?bbox=minlon,minlat,maxlon,maxlat`.
    pub fn map_url(&self, bbox: &Rect<f64>) -> Result<Url, FetchError> {
        let mut url = self.endpoint("api/0.6/map.json")?;
        url.query_pairs_mut().append_pair("bbox", &bbox_param(bbox));
        Ok(url)
    }

    /// Fetch the raw map document for `bbox`.
    pub async fn fetch_map(&self, bbox: &Rect<f64>) -> Result<MapDocument, FetchError> {
        let url = self.map_url(bbox)?;
        self.get_json(&url).await
    }

    /// Fetch the server's advertised limits.
    pub async fn capabilities(&self) -> Result<CapabilitiesDocument, FetchError> {
        let url = self.endpoint("api/capabilities.json")?;
        self.get_json(&url).await
    }

    /// Fetch the API versions the server supports.
    pub async fn versions(&self) -> Result<VersionsDocument, FetchError> {
        let url = self.endpoint("api/versions.json")?;
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        serde_json::from_str(&text).map_err(|err| FetchError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    /// Convert a reqwest error to a `FetchError`.
    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &Url) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: error.to_string(),
            };
        }

        if error.is_decode() {
            return FetchError::Decode {
                url: url.to_string(),
                message: error.to_string(),
            };
        }

        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl FeatureSource for OsmApiSource {
    async fn fetch_bbox(&self, bbox: &Rect<f64>) -> Result<FeatureBatch, FetchError> {
        let batch = self.fetch_map(bbox).await?.into_batch();
        debug!(
            "Fetched {}: points={}, lines={}",
            bbox_param(bbox),
            batch.points.len(),
            batch.lines.len()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosm_core::bbox::rect;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.expect("read request");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write response");
        });
        format!("http://{addr}")
    }

    #[rstest]
    #[case("https://api.openstreetmap.org")]
    #[case("https://api.openstreetmap.org/")]
    fn map_url_carries_bbox(#[case] base: &str) {
        let source = OsmApiSource::new(base).expect("source should build");
        let url = source
            .map_url(&rect(-0.5, 51.25, 0.5, 51.75))
            .expect("url should build");
        assert_eq!(url.path(), "/api/0.6/map.json");
        let bbox: Vec<_> = url.query_pairs().collect();
        assert_eq!(bbox.len(), 1);
        assert_eq!(bbox[0].0, "bbox");
        assert_eq!(bbox[0].1, "-0.5,51.25,0.5,51.75");
    }

    #[rstest]
    fn base_path_is_kept() {
        let source = OsmApiSource::new("http://localhost:3000/osm").expect("source should build");
        let url = source.map_url(&rect(0.0, 0.0, 1.0, 1.0)).expect("url");
        assert_eq!(url.path(), "/osm/api/0.6/map.json");
    }

    #[rstest]
    fn rejects_invalid_base_url() {
        let err = OsmApiSource::new("not a url").expect_err("expected failure");
        assert!(matches!(err, SourceBuildError::InvalidBaseUrl { .. }));
    }

    #[rstest]
    fn config_builder_sets_fields() {
        let config = OsmApiConfig::new("http://localhost")
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("test/1.0");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "test/1.0");
        assert_eq!(OsmApiConfig::default().base_url, DEFAULT_BASE_URL);
    }

    #[rstest]
    #[tokio::test]
    async fn fetch_decodes_map_document() {
        let base = serve_once(
            "200 OK",
            r#"{"elements":[{"type":"node","id":1,"lat":0.5,"lon":0.5,"tags":{"highway":"stop"}}]}"#,
        )
        .await;
        let source = OsmApiSource::new(base).expect("source should build");
        let batch = source
            .fetch_bbox(&rect(0.0, 0.0, 1.0, 1.0))
            .await
            .expect("fetch should succeed");
        assert_eq!(batch.points.len(), 1);
        assert!(batch.lines.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn non_success_status_carries_body() {
        let base = serve_once("400 Bad Request", "You requested too many nodes").await;
        let source = OsmApiSource::new(base).expect("source should build");
        let err = source
            .fetch_bbox(&rect(0.0, 0.0, 1.0, 1.0))
            .await
            .expect_err("expected status error");
        match err {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body, "You requested too many nodes");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let base = serve_once("200 OK", "<osm/>").await;
        let source = OsmApiSource::new(base).expect("source should build");
        let err = source
            .fetch_bbox(&rect(0.0, 0.0, 1.0, 1.0))
            .await
            .expect_err("expected decode error");
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
