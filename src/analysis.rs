//! Fetch-backed analysis: two NDVI windows in, ranked alerts out.
//!
//! One token is obtained per analysis and shared by both fetches, which run
//! concurrently. Detection itself is the same engine `POST /detect` uses.

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::DetectionConfig;
use crate::engine::ChangeDetectionEngine;
use crate::error::DetectionError;
use crate::imagery::{BoundingBox, FetchRequest, SentinelHubClient, TimeWindow};
use crate::model::{AnalysisResponse, TimeRange};

/// Why an analysis failed.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Token exchange, download or decoding failed.
    #[error("imagery provider error: {0:#}")]
    Provider(#[from] anyhow::Error),

    /// The fetched rasters or the config were rejected by the engine.
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// Past and recent windows of `days` each, the recent one ending at `today`.
pub fn time_range_ending(today: NaiveDate, days: u32) -> TimeRange {
    let (past, recent) = TimeWindow::consecutive(today, days);
    TimeRange { past, recent }
}

/// Fetch NDVI for both windows over `bbox` and run change detection.
///
/// # Arguments
///
/// * `client` - Imagery provider client
/// * `bbox` - Validated area of interest
/// * `time_range` - The past and recent acquisition windows
/// * `config` - Detection parameters
/// * `size` - Output width and height of each fetched raster, in pixels
#[instrument(skip(client, config), fields(past = %time_range.past, recent = %time_range.recent))]
pub async fn analyze(
    client: &SentinelHubClient,
    bbox: BoundingBox,
    time_range: TimeRange,
    config: &DetectionConfig,
    size: u32,
) -> Result<AnalysisResponse, AnalysisError> {
    config.validate()?;

    let token = client.fetch_token().await?;
    let past_request = FetchRequest::ndvi(bbox, time_range.past, size);
    let recent_request = FetchRequest::ndvi(bbox, time_range.recent, size);

    let (past, recent) = tokio::try_join!(
        client.fetch_ndvi_raster(&token, &past_request),
        client.fetch_ndvi_raster(&token, &recent_request),
    )?;

    let report = ChangeDetectionEngine::new().run(&past, &recent, config)?;
    let mut summary = report.summary;
    summary.area_analyzed_km2 = Some(bbox.area_km2());

    info!(
        area_km2 = bbox.area_km2(),
        alerts = summary.total_alerts,
        change_percentage = summary.change_percentage,
        "Analysis complete"
    );

    Ok(AnalysisResponse {
        timestamp: Utc::now(),
        bbox,
        time_range,
        summary,
        alerts: report.alerts,
    })
}
