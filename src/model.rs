//! Request and response types for the HTTP API.
//!
//! Wire names are camelCase throughout. Engine output types ([`Alert`],
//! [`AlertSummary`]) are reused directly rather than mirrored here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertSummary};
use crate::config::DetectionConfig;
use crate::imagery::sentinel::CatalogScene;
use crate::imagery::{BoundingBox, TimeWindow};
use crate::raster::RasterBuffer;

/// Request body for `POST /detect`.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectRequest {
    pub past: RasterBuffer,
    pub recent: RasterBuffer,
    #[serde(default)]
    pub config: Option<DetectionConfig>,
}

/// Request body for `POST /analyze-deforestation`.
///
/// ```json
/// { "bbox": [-60.1, -3.1, -60.0, -3.0], "windowDays": 30 }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub bbox: BoundingBox,
    #[serde(default)]
    pub window_days: Option<u32>,
    #[serde(default)]
    pub config: Option<DetectionConfig>,
}

/// The two acquisition windows an analysis compared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub past: TimeWindow,
    pub recent: TimeWindow,
}

/// Result of a fetch-backed analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub timestamp: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub time_range: TimeRange,
    pub summary: AlertSummary,
    pub alerts: Vec<Alert>,
}

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub imagery_configured: bool,
}

/// Response for `GET /config`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub detection: DetectionConfig,
    pub window_days: u32,
    pub raster_size: u32,
    pub max_area_km2: f64,
}

/// Successful response for `POST /validate-coordinates`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub area_km2: f64,
    pub message: String,
}

/// Rejected coordinates, one message per broken rule.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrors {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// JSON error body returned by every failing handler.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Query parameters for `GET /images/search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Comma form `minLon,minLat,maxLon,maxLat`.
    pub bbox: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    10
}

/// Response for `GET /images/search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub scenes: Vec<CatalogScene>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_request_minimal() {
        let request: AnalyzeRequest =
            serde_json::from_str(r#"{"bbox": [-60.1, -3.1, -60.0, -3.0]}"#).unwrap();

        assert_eq!(request.bbox.min_lon, -60.1);
        assert!(request.window_days.is_none());
        assert!(request.config.is_none());
    }

    #[test]
    fn test_analyze_request_rejects_invalid_bbox() {
        let result = serde_json::from_str::<AnalyzeRequest>(r#"{"bbox": [0, 0, 0, 0]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_detect_request_with_partial_config() {
        let body = r#"{
            "past":   {"width": 1, "height": 1, "values": [0.8], "geoTransform": [0, 1, 0, 0, 0, -1]},
            "recent": {"width": 1, "height": 1, "values": [null], "geoTransform": [0, 1, 0, 0, 0, -1]},
            "config": {"minRegionPixels": 1}
        }"#;

        let request: DetectRequest = serde_json::from_str(body).unwrap();

        assert_eq!(request.config.unwrap().min_region_pixels, 1);
        assert_eq!(request.recent.sample(0, 0).unwrap(), None);
    }

    #[test]
    fn test_search_query_default_limit() {
        let query: SearchQuery = serde_json::from_str(
            r#"{"bbox": "-60.1,-3.1,-60.0,-3.0", "dateFrom": "2024-01-01", "dateTo": "2024-01-31"}"#,
        )
        .unwrap();

        assert_eq!(query.max_results, 10);
    }
}
