//! The change-detection pipeline: difference, threshold, cluster, score.

use serde::Serialize;
use tracing::{debug, info};

use crate::alert::{Alert, AlertBuilder, AlertSummary};
use crate::change::compute_change;
use crate::cluster::RegionClusterer;
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::mask::threshold;
use crate::raster::RasterBuffer;

/// Alerts plus coverage figures from one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub alerts: Vec<Alert>,
    pub summary: AlertSummary,
}

/// Runs detections while reusing the clusterer's scratch buffers.
#[derive(Debug, Default)]
pub struct ChangeDetectionEngine {
    clusterer: RegionClusterer,
}

impl ChangeDetectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect vegetation-loss regions between `past` and `recent`.
    ///
    /// Fails fast on invalid config or mismatched rasters. The output is
    /// fully determined by the inputs.
    pub fn run(
        &mut self,
        past: &RasterBuffer,
        recent: &RasterBuffer,
        config: &DetectionConfig,
    ) -> Result<DetectionReport> {
        config.validate()?;

        let change = compute_change(past, recent)?;
        let mask = threshold(&change, config.change_threshold);
        let regions = self.clusterer.cluster(&mask);

        debug!(
            candidates = mask.candidate_count(),
            regions = regions.len(),
            "Clustered candidate pixels"
        );

        let alerts = AlertBuilder::new(config, past.geo_transform()).build(&regions);
        let summary = AlertSummary::new(&alerts, mask.candidate_count(), change.valid_count());

        info!(
            width = past.width(),
            height = past.height(),
            alerts = alerts.len(),
            critical = summary.critical_alerts,
            "Change detection complete"
        );

        Ok(DetectionReport { alerts, summary })
    }
}

/// Detect vegetation-loss alerts between two co-registered rasters.
pub fn detect(
    past: &RasterBuffer,
    recent: &RasterBuffer,
    config: &DetectionConfig,
) -> Result<Vec<Alert>> {
    Ok(ChangeDetectionEngine::new()
        .run(past, recent, config)?
        .alerts)
}
