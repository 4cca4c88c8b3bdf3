//! Sentinel Hub client.
//!
//! Sentinel-2 L2A imagery is requested through the Process API, which runs an
//! evalscript server-side and returns the rendered raster. Authentication is
//! an OAuth2 client-credentials exchange; the resulting [`AccessToken`] is
//! handed back to the caller rather than cached here.
//!
//! # API Reference
//!
//! See: <https://docs.sentinel-hub.com/api/latest/api/process/>

use anyhow::{Context, bail};
use chrono::Utc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::decode::decode_tiff;
use super::{AccessToken, BoundingBox, FetchRequest, MosaickingOrder, TimeWindow};
use crate::config::{DEFAULT_SENTINEL_BASE_URL, ProviderCredentials};
use crate::raster::RasterBuffer;

/// Data collection every request targets.
const COLLECTION: &str = "sentinel-2-l2a";

/// CRS identifier for WGS84 longitude/latitude bounds.
const WGS84_CRS: &str = "http://www.opengis.net/def/crs/EPSG/0/4326";

/// Attempts per call when the provider is throttling or failing.
const MAX_ATTEMPTS: u32 = 3;

/// Delay before retry `n` is `n` times this.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Client for the Sentinel Hub OAuth, Process and Catalog APIs.
#[derive(Clone)]
pub struct SentinelHubClient {
    client: reqwest::Client,
    base_url: String,
    credentials: ProviderCredentials,
}

impl SentinelHubClient {
    /// Create a client against the public Sentinel Hub endpoint.
    pub fn new(credentials: ProviderCredentials) -> Self {
        Self::with_base_url(DEFAULT_SENTINEL_BASE_URL, credentials)
    }

    /// Create a client with a custom base URL (for testing or regional hosts).
    pub fn with_base_url(base_url: &str, credentials: ProviderCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Exchange the client credentials for a bearer token.
    #[instrument(skip(self))]
    pub async fn fetch_token(&self) -> anyhow::Result<AccessToken> {
        let url = format!("{}/oauth/token", self.base_url);
        let issued_at = Utc::now();

        let response = self
            .send_with_retry("token", || {
                self.client.post(&url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", self.credentials.client_id.as_str()),
                    ("client_secret", self.credentials.client_secret.as_str()),
                ])
            })
            .await?;

        let token = response
            .json::<TokenResponse>()
            .await
            .context("malformed token response")?;
        debug!(expires_in = token.expires_in, "Obtained access token");

        Ok(AccessToken::new(
            token.access_token,
            issued_at,
            token.expires_in,
        ))
    }

    /// Run a Process API request and return the raw response bytes.
    #[instrument(skip(self, token, request), fields(window = %request.window, evalscript = ?request.evalscript))]
    pub async fn fetch_image(
        &self,
        token: &AccessToken,
        request: &FetchRequest,
    ) -> anyhow::Result<Vec<u8>> {
        if !token.is_valid_at(Utc::now()) {
            bail!("access token expired at {}", token.expires_at());
        }

        let url = format!("{}/api/v1/process", self.base_url);
        let body = ProcessRequest::from_fetch(request);
        let format = request.evalscript.output_format();

        let response = self
            .send_with_retry("process API", || {
                self.client
                    .post(&url)
                    .bearer_auth(token.value())
                    .header(reqwest::header::ACCEPT, format)
                    .json(&body)
            })
            .await?;

        let bytes = response.bytes().await?;
        debug!(bytes = bytes.len(), "Received raster");
        Ok(bytes.to_vec())
    }

    /// Fetch an NDVI request and decode it into a georeferenced raster.
    pub async fn fetch_ndvi_raster(
        &self,
        token: &AccessToken,
        request: &FetchRequest,
    ) -> anyhow::Result<RasterBuffer> {
        let bytes = self.fetch_image(token, request).await?;
        let geo_transform = request
            .bbox
            .geo_transform(request.width as usize, request.height as usize);
        let raster = decode_tiff(&bytes, geo_transform, None)
            .with_context(|| format!("decoding NDVI raster for {}", request.window))?;

        if raster.width() != request.width as usize || raster.height() != request.height as usize {
            bail!(
                "provider returned {}x{} raster, requested {}x{}",
                raster.width(),
                raster.height(),
                request.width,
                request.height
            );
        }
        Ok(raster)
    }

    /// Search the catalog for scenes intersecting `bbox` within `window`.
    #[instrument(skip(self, token))]
    pub async fn search_catalog(
        &self,
        token: &AccessToken,
        bbox: BoundingBox,
        window: TimeWindow,
        limit: u32,
    ) -> anyhow::Result<Vec<CatalogScene>> {
        let url = format!("{}/api/v1/catalog/1.0.0/search", self.base_url);
        let (from, to) = window.rfc3339_bounds();
        let body = CatalogSearch {
            bbox: bbox.to_array(),
            datetime: format!("{}/{}", from, to),
            collections: vec![COLLECTION],
            limit,
        };

        let response = self
            .send_with_retry("catalog API", || {
                self.client
                    .post(&url)
                    .bearer_auth(token.value())
                    .json(&body)
            })
            .await?;

        let data = response
            .json::<CatalogResponse>()
            .await
            .context("malformed catalog response")?;
        Ok(data.features.into_iter().map(CatalogScene::from).collect())
    }

    /// Send the request built by `build`, retrying transport errors, 429 and
    /// 5xx responses. Any other non-success status fails immediately.
    async fn send_with_retry<F>(&self, what: &str, build: F) -> anyhow::Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            let retryable = match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let error = anyhow::anyhow!("{} error: {} - {}", what, status, body);
                    if !(status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS)
                    {
                        return Err(error);
                    }
                    error
                }
                Err(e) => anyhow::Error::new(e).context(format!("{} request failed", what)),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(retryable);
            }
            warn!(what, attempt, error = %retryable, "Retrying provider request");
            tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            attempt += 1;
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Process API request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    input: ProcessInput,
    output: ProcessOutput,
    evalscript: &'static str,
}

#[derive(Debug, Serialize)]
struct ProcessInput {
    bounds: ProcessBounds,
    data: Vec<ProcessData>,
}

#[derive(Debug, Serialize)]
struct ProcessBounds {
    bbox: [f64; 4],
    properties: CrsProperties,
}

#[derive(Debug, Serialize)]
struct CrsProperties {
    crs: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessData {
    #[serde(rename = "type")]
    collection: &'static str,
    data_filter: DataFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataFilter {
    time_range: TimeRange,
    mosaicking_order: MosaickingOrder,
    max_cloud_coverage: u8,
}

#[derive(Debug, Serialize)]
struct TimeRange {
    from: String,
    to: String,
}

#[derive(Debug, Serialize)]
struct ProcessOutput {
    width: u32,
    height: u32,
    responses: Vec<OutputResponse>,
}

#[derive(Debug, Serialize)]
struct OutputResponse {
    identifier: &'static str,
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct OutputFormat {
    #[serde(rename = "type")]
    mime: &'static str,
}

impl ProcessRequest {
    pub fn from_fetch(request: &FetchRequest) -> Self {
        let (from, to) = request.window.rfc3339_bounds();
        Self {
            input: ProcessInput {
                bounds: ProcessBounds {
                    bbox: request.bbox.to_array(),
                    properties: CrsProperties { crs: WGS84_CRS },
                },
                data: vec![ProcessData {
                    collection: COLLECTION,
                    data_filter: DataFilter {
                        time_range: TimeRange { from, to },
                        mosaicking_order: request.mosaicking,
                        max_cloud_coverage: request.max_cloud_coverage,
                    },
                }],
            },
            output: ProcessOutput {
                width: request.width,
                height: request.height,
                responses: vec![OutputResponse {
                    identifier: "default",
                    format: OutputFormat {
                        mime: request.evalscript.output_format(),
                    },
                }],
            },
            evalscript: request.evalscript.source(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CatalogSearch {
    bbox: [f64; 4],
    datetime: String,
    collections: Vec<&'static str>,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    features: Vec<CatalogFeature>,
}

#[derive(Debug, Deserialize)]
struct CatalogFeature {
    id: String,
    #[serde(default)]
    properties: CatalogProperties,
    #[serde(default)]
    assets: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogProperties {
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default, rename = "eo:cloud_cover")]
    cloud_cover: Option<f64>,
}

/// A scene available from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogScene {
    pub id: String,
    pub datetime: Option<String>,
    pub cloud_cover: Option<f64>,
    pub assets: Vec<String>,
}

impl From<CatalogFeature> for CatalogScene {
    fn from(feature: CatalogFeature) -> Self {
        Self {
            id: feature.id,
            datetime: feature.properties.datetime,
            cloud_cover: feature.properties.cloud_cover,
            assets: feature.assets.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request() -> FetchRequest {
        let bbox = BoundingBox::new([-60.1, -3.1, -60.0, -3.0]).unwrap();
        let window = TimeWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        FetchRequest::ndvi(bbox, window, 64)
    }

    #[test]
    fn test_process_request_body() {
        let body = serde_json::to_value(ProcessRequest::from_fetch(&request())).unwrap();

        assert_eq!(body["input"]["bounds"]["bbox"][0], -60.1);
        assert_eq!(body["input"]["bounds"]["properties"]["crs"], WGS84_CRS);
        let filter = &body["input"]["data"][0]["dataFilter"];
        assert_eq!(body["input"]["data"][0]["type"], "sentinel-2-l2a");
        assert_eq!(filter["timeRange"]["from"], "2024-01-01T00:00:00Z");
        assert_eq!(filter["timeRange"]["to"], "2024-01-31T23:59:59Z");
        assert_eq!(filter["mosaickingOrder"], "leastCC");
        assert_eq!(filter["maxCloudCoverage"], 30);
        assert_eq!(body["output"]["width"], 64);
        assert_eq!(body["output"]["responses"][0]["format"]["type"], "image/tiff");
        assert!(body["evalscript"].as_str().unwrap().contains("dataMask"));
    }

    #[test]
    fn test_catalog_feature_conversion() {
        let data: CatalogResponse = serde_json::from_value(serde_json::json!({
            "features": [{
                "id": "S2A_20240105",
                "properties": { "datetime": "2024-01-05T14:02:11Z", "eo:cloud_cover": 12.5 },
                "assets": { "thumbnail": {}, "data": {} }
            }]
        }))
        .unwrap();

        let scenes: Vec<CatalogScene> = data.features.into_iter().map(CatalogScene::from).collect();

        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, "S2A_20240105");
        assert_eq!(scenes[0].cloud_cover, Some(12.5));
        assert_eq!(scenes[0].assets.len(), 2);
    }

    #[test]
    fn test_token_response_default_expiry() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_before_sending() {
        let client = SentinelHubClient::with_base_url(
            "http://127.0.0.1:9",
            ProviderCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        );
        let stale = AccessToken::new("t".to_string(), Utc::now() - chrono::Duration::hours(2), 3600);

        let err = client.fetch_image(&stale, &request()).await.unwrap_err();

        assert!(err.to_string().contains("expired"));
    }
}
