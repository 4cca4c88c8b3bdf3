//! HTTP API handlers for ForestWatch.
//!
//! # Endpoints
//!
//! - `GET /health`: liveness plus whether imagery credentials are configured
//! - `GET /config`: default detection parameters and fetch settings
//! - `POST /validate-coordinates`: check a `[minLon, minLat, maxLon, maxLat]` box
//! - `POST /detect`: run the engine on caller-supplied rasters
//! - `POST /analyze-deforestation`: fetch two NDVI windows and run the engine
//! - `GET /images/search`: list catalog scenes over a box and date range
//!
//! Failures are JSON `{ "error", "message" }` bodies. Malformed input is 400,
//! rasters or config rejected by the engine are 422, and provider trouble
//! (including missing credentials) is 503.

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::analysis::{AnalysisError, analyze, time_range_ending};
use crate::config::ServerConfig;
use crate::engine::{ChangeDetectionEngine, DetectionReport};
use crate::error::DetectionError;
use crate::imagery::{BboxError, BoundingBox, MAX_AREA_KM2, SentinelHubClient, TimeWindow};
use crate::model::{
    AnalysisResponse, AnalyzeRequest, ConfigResponse, DetectRequest, ErrorBody, HealthResponse,
    SearchQuery, SearchResponse, ValidateResponse, ValidationErrors,
};

/// Most catalog results a single search may ask for.
const MAX_SEARCH_RESULTS: u32 = 100;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// `None` when no provider credentials are configured.
    pub imagery: Option<SentinelHubClient>,
}

impl AppState {
    /// Build state from config, creating the imagery client if credentials exist.
    pub fn new(config: ServerConfig) -> Self {
        let imagery = config
            .credentials
            .clone()
            .map(|creds| SentinelHubClient::with_base_url(&config.sentinel_base_url, creds));
        Self { config, imagery }
    }

    fn imagery(&self) -> Result<&SentinelHubClient, ApiError> {
        self.imagery.as_ref().ok_or_else(|| {
            warn!("Imagery provider not configured");
            ApiError::NotConfigured
        })
    }
}

/// Build the application router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        .route("/validate-coordinates", post(validate_coordinates))
        .route("/detect", post(post_detect))
        .route("/analyze-deforestation", post(analyze_deforestation))
        .route("/images/search", get(search_images))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Handler failure, rendered as a status code plus [`ErrorBody`].
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or out-of-range request input.
    Validation(String),
    /// The engine rejected the rasters or config.
    Detection(DetectionError),
    /// The imagery provider failed.
    Provider(String),
    /// No provider credentials are configured.
    NotConfigured,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Detection(e) if e.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Detection(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider(_) | ApiError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, message) = match self {
            ApiError::Validation(msg) => ("invalid_request", msg.clone()),
            ApiError::Detection(e) => ("detection_failed", e.to_string()),
            ApiError::Provider(msg) => ("imagery_unavailable", msg.clone()),
            ApiError::NotConfigured => (
                "imagery_not_configured",
                "Sentinel Hub credentials are not configured".to_string(),
            ),
        };
        ErrorBody {
            error: error.to_string(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<DetectionError> for ApiError {
    fn from(e: DetectionError) -> Self {
        ApiError::Detection(e)
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::Detection(e) => ApiError::Detection(e),
            AnalysisError::Provider(e) => ApiError::Provider(format!("{:#}", e)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Liveness check.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        imagery_configured: state.imagery.is_some(),
    })
}

/// GET /config - Default detection parameters and fetch settings.
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        detection: Default::default(),
        window_days: state.config.window_days,
        raster_size: state.config.raster_size,
        max_area_km2: MAX_AREA_KM2,
    })
}

/// POST /validate-coordinates - Check a bounding box.
///
/// # Request Body
///
/// ```json
/// [-60.1, -3.1, -60.0, -3.0]
/// ```
///
/// # Response
///
/// `200` with `{ "valid": true, "areaKm2": ..., "message": ... }`, or `400`
/// with `{ "valid": false, "errors": [...] }` listing every broken rule.
#[instrument(skip(payload))]
pub async fn validate_coordinates(
    payload: Result<Json<Vec<f64>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(coords) = payload?;

    let coords: [f64; 4] = match coords.try_into() {
        Ok(coords) => coords,
        Err(_) => {
            return Ok(invalid_coordinates(vec![
                "Coordinates must contain exactly 4 values: [min_lon, min_lat, max_lon, max_lat]"
                    .to_string(),
            ]));
        }
    };

    match BoundingBox::new(coords) {
        Ok(bbox) => {
            let area_km2 = bbox.area_km2();
            info!(area_km2, "Coordinates validated");
            Ok(Json(ValidateResponse {
                valid: true,
                area_km2,
                message: format!("Valid bounding box covering {:.1} km²", area_km2),
            })
            .into_response())
        }
        Err(e) => Ok(invalid_coordinates(e.0)),
    }
}

fn invalid_coordinates(errors: Vec<String>) -> Response {
    warn!(errors = ?errors, "Coordinates rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(ValidationErrors {
            valid: false,
            errors,
        }),
    )
        .into_response()
}

/// POST /detect - Run change detection on caller-supplied rasters.
///
/// # Request Body
///
/// ```json
/// {
///     "past":   { "width": 3, "height": 3, "values": [...], "geoTransform": [...] },
///     "recent": { "width": 3, "height": 3, "values": [...], "geoTransform": [...] },
///     "config": { "minRegionPixels": 1 }
/// }
/// ```
///
/// `values` may contain `null` for no-data; `config` fields are optional.
#[instrument(skip(payload))]
pub async fn post_detect(
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectionReport>, ApiError> {
    let Json(request) = payload?;
    let config = request.config.unwrap_or_default();

    let report = ChangeDetectionEngine::new()
        .run(&request.past, &request.recent, &config)
        .inspect_err(|e| warn!(error = %e, "Detection rejected"))?;

    info!(
        width = request.past.width(),
        height = request.past.height(),
        alerts = report.alerts.len(),
        top_severity = report.alerts.first().map_or("none", |a| a.severity.label()),
        "Detection served"
    );
    Ok(Json(report))
}

/// POST /analyze-deforestation - Fetch two NDVI windows and detect loss.
///
/// # Request Body
///
/// ```json
/// { "bbox": [-60.1, -3.1, -60.0, -3.0], "windowDays": 30, "config": {} }
/// ```
///
/// The recent window ends today and the past window immediately precedes it.
#[instrument(skip(state, payload))]
pub async fn analyze_deforestation(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = payload?;
    let client = state.imagery()?;

    let window_days = request.window_days.unwrap_or(state.config.window_days);
    if window_days == 0 {
        return Err(ApiError::Validation(
            "windowDays must be at least 1".to_string(),
        ));
    }
    let time_range = time_range_ending(Utc::now().date_naive(), window_days);
    let config = request.config.unwrap_or_default();

    let response = analyze(
        client,
        request.bbox,
        time_range,
        &config,
        state.config.raster_size,
    )
    .await
    .inspect_err(|e| warn!(error = %e, "Analysis failed"))?;

    Ok(Json(response))
}

/// GET /images/search - List catalog scenes.
///
/// # Query Parameters
///
/// - `bbox` (required): `minLon,minLat,maxLon,maxLat`
/// - `dateFrom`, `dateTo` (required): `YYYY-MM-DD`, inclusive
/// - `maxResults` (optional): default 10, capped at 100
#[instrument(skip(state, query))]
pub async fn search_images(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(query) = query?;

    let bbox: BoundingBox = query
        .bbox
        .parse()
        .map_err(|e: BboxError| ApiError::Validation(e.0.join("; ")))?;
    let window = TimeWindow::new(query.date_from, query.date_to).ok_or_else(|| {
        ApiError::Validation("dateFrom must not be after dateTo".to_string())
    })?;
    let limit = query.max_results.clamp(1, MAX_SEARCH_RESULTS);

    let client = state.imagery()?;
    let provider_error = |e: anyhow::Error| {
        warn!(error = %e, "Catalog search failed");
        ApiError::Provider(format!("{:#}", e))
    };
    let token = client.fetch_token().await.map_err(provider_error)?;
    let scenes = client
        .search_catalog(&token, bbox, window, limit)
        .await
        .map_err(provider_error)?;

    info!(count = scenes.len(), window = %window, "Catalog searched");
    Ok(Json(SearchResponse {
        count: scenes.len(),
        scenes,
    }))
}
