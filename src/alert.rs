//! Turning regions into scored, geolocated alerts.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cluster::Region;
use crate::config::DetectionConfig;
use crate::error::DetectionError;
use crate::raster::{GeoPoint, GeoTransform};

/// Alert severity tiers, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    Critical,
}

impl Severity {
    /// Classify a region's mean change.
    ///
    /// - `Critical`: `mean_change <= critical_threshold`
    /// - `Moderate`: `critical_threshold < mean_change <= moderate_threshold`
    /// - `Low`: anything above `moderate_threshold`
    pub fn classify(mean_change: f64, config: &DetectionConfig) -> Self {
        if mean_change <= config.critical_threshold {
            Severity::Critical
        } else if mean_change <= config.moderate_threshold {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::Critical => "Critical",
        }
    }
}

/// Geographic bounding box with `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoBbox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoBbox {
    fn enclosing(points: &[GeoPoint]) -> Self {
        points.iter().fold(
            GeoBbox {
                min_lat: f64::INFINITY,
                min_lon: f64::INFINITY,
                max_lat: f64::NEG_INFINITY,
                max_lon: f64::NEG_INFINITY,
            },
            |acc, p| GeoBbox {
                min_lat: acc.min_lat.min(p.lat),
                min_lon: acc.min_lon.min(p.lon),
                max_lat: acc.max_lat.max(p.lat),
                max_lon: acc.max_lon.max(p.lon),
            },
        )
    }
}

/// A candidate deforestation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// 1-based rank after sorting by severity then confidence.
    pub id: u32,
    pub severity: Severity,
    /// Score in `[0, 1]`; larger and more severe regions score higher.
    pub confidence: f64,
    pub area_pixels: usize,
    pub avg_ndvi_change: f64,
    pub center_coordinates: GeoPoint,
    pub geographic_bbox: GeoBbox,
    /// Flat index of the region's seed pixel.
    #[serde(skip)]
    pub seed: usize,
}

/// Counts over a finished alert list plus raster-level coverage figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub moderate_alerts: usize,
    pub low_alerts: usize,
    /// Alerts with confidence above 0.8.
    pub high_confidence_alerts: usize,
    /// Candidate pixels before clustering and noise suppression.
    pub total_changed_pixels: usize,
    /// Candidate pixels as a percentage of pixels valid in both rasters.
    pub change_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_analyzed_km2: Option<f64>,
}

impl AlertSummary {
    pub fn new(alerts: &[Alert], changed_pixels: usize, valid_pixels: usize) -> Self {
        let count = |severity: Severity| alerts.iter().filter(|a| a.severity == severity).count();
        let change_percentage = if valid_pixels > 0 {
            (changed_pixels as f64 / valid_pixels as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            total_alerts: alerts.len(),
            critical_alerts: count(Severity::Critical),
            moderate_alerts: count(Severity::Moderate),
            low_alerts: count(Severity::Low),
            high_confidence_alerts: alerts.iter().filter(|a| a.confidence > 0.8).count(),
            total_changed_pixels: changed_pixels,
            change_percentage,
            area_analyzed_km2: None,
        }
    }
}

/// Scores, geolocates and ranks regions.
#[derive(Debug, Clone, Copy)]
pub struct AlertBuilder<'a> {
    config: &'a DetectionConfig,
    geo_transform: &'a GeoTransform,
}

impl<'a> AlertBuilder<'a> {
    pub fn new(config: &'a DetectionConfig, geo_transform: &'a GeoTransform) -> Self {
        Self {
            config,
            geo_transform,
        }
    }

    /// Confidence from change magnitude (relative to the critical threshold)
    /// and region size (relative to the large-region reference), combined by
    /// the configured weights.
    pub fn confidence(&self, mean_change: f64, pixel_count: usize) -> f64 {
        let config = self.config;
        let magnitude = (mean_change.min(0.0) / config.critical_threshold).clamp(0.0, 1.0);
        let size = (pixel_count as f64 / config.large_region_reference as f64).clamp(0.0, 1.0);
        let total_weight = config.magnitude_weight + config.size_weight;

        ((config.magnitude_weight * magnitude + config.size_weight * size) / total_weight)
            .clamp(0.0, 1.0)
    }

    /// Build the ranked alert list. Regions below the minimum size are
    /// dropped; anomalous regions are logged and skipped.
    pub fn build(&self, regions: &[Region]) -> Vec<Alert> {
        let mut ranked: Vec<(usize, Alert)> = Vec::with_capacity(regions.len());

        for region in regions {
            if let Err(e) = check_region(region) {
                warn!(seed = region.seed, error = %e, "Skipping anomalous region");
                continue;
            }
            if region.pixel_count() < self.config.min_region_pixels {
                continue;
            }

            let alert = self.alert_for(region);
            if alert.confidence < self.config.min_confidence {
                debug!(
                    seed = region.seed,
                    confidence = alert.confidence,
                    "Region below confidence gate"
                );
                continue;
            }
            ranked.push((region.scan_order, alert));
        }

        ranked.sort_by(|(a_order, a), (b_order, b)| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a_order.cmp(b_order))
        });

        ranked
            .into_iter()
            .zip(1u32..)
            .map(|((_, mut alert), id)| {
                alert.id = id;
                alert
            })
            .collect()
    }

    fn alert_for(&self, region: &Region) -> Alert {
        let center_col = region.centroid.0.round() as usize;
        let center_row = region.centroid.1.round() as usize;
        let b = region.bounds;
        let gt = self.geo_transform;
        let corners = [
            gt.pixel_corner_to_geo(b.min_col, b.min_row),
            gt.pixel_corner_to_geo(b.max_col + 1, b.min_row),
            gt.pixel_corner_to_geo(b.min_col, b.max_row + 1),
            gt.pixel_corner_to_geo(b.max_col + 1, b.max_row + 1),
        ];

        Alert {
            id: 0,
            severity: Severity::classify(region.mean_change, self.config),
            confidence: self.confidence(region.mean_change, region.pixel_count()),
            area_pixels: region.pixel_count(),
            avg_ndvi_change: region.mean_change,
            center_coordinates: gt.pixel_to_geo(center_col, center_row),
            geographic_bbox: GeoBbox::enclosing(&corners),
            seed: region.seed,
        }
    }
}

fn check_region(region: &Region) -> Result<(), DetectionError> {
    let anomaly = |reason: &str| DetectionError::AnomalousRegion {
        seed: region.seed,
        reason: reason.to_string(),
    };

    if region.pixels.is_empty() {
        return Err(anomaly("region has no pixels"));
    }
    if !region.mean_change.is_finite() || !region.min_change.is_finite() {
        return Err(anomaly("non-finite change statistics"));
    }
    let b = region.bounds;
    if b.min_col > b.max_col || b.min_row > b.max_row {
        return Err(anomaly("inverted pixel bounds"));
    }
    if region.pixel_count() > b.width() * b.height() {
        return Err(anomaly("more pixels than its bounding rectangle holds"));
    }
    Ok(())
}
