//! Detection parameters and server settings.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default Sentinel Hub services root.
pub const DEFAULT_SENTINEL_BASE_URL: &str = "https://services.sentinel-hub.com";

/// Default length of each acquisition window in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Default width and height of fetched rasters in pixels.
pub const DEFAULT_RASTER_SIZE: u32 = 512;

/// Tunable parameters of the change-detection engine.
///
/// Every field is optional on the wire; missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    /// Pixels with `change <= change_threshold` become candidates.
    pub change_threshold: f64,

    /// Mean change at or below which a region is `Critical`.
    pub critical_threshold: f64,

    /// Mean change at or below which a region is at least `Moderate`.
    pub moderate_threshold: f64,

    /// Regions smaller than this are treated as noise.
    pub min_region_pixels: usize,

    /// Pixel count at which the size term of confidence saturates.
    pub large_region_reference: usize,

    /// Weight of the change-magnitude term in confidence.
    pub magnitude_weight: f64,

    /// Weight of the region-size term in confidence.
    pub size_weight: f64,

    /// Alerts scoring below this confidence are dropped.
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            change_threshold: -0.15,
            critical_threshold: -0.30,
            moderate_threshold: -0.15,
            min_region_pixels: 3,
            large_region_reference: 100,
            magnitude_weight: 0.6,
            size_weight: 0.4,
            min_confidence: 0.0,
        }
    }
}

impl DetectionConfig {
    /// Check threshold ordering and confidence parameters.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.change_threshold,
            self.critical_threshold,
            self.moderate_threshold,
            self.magnitude_weight,
            self.size_weight,
            self.min_confidence,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(DetectionError::InvalidConfig(
                "all numeric parameters must be finite".to_string(),
            ));
        }
        if !(self.critical_threshold < self.moderate_threshold && self.moderate_threshold < 0.0) {
            return Err(DetectionError::InvalidConfig(format!(
                "expected criticalThreshold < moderateThreshold < 0, got {} and {}",
                self.critical_threshold, self.moderate_threshold
            )));
        }
        if self.large_region_reference == 0 {
            return Err(DetectionError::InvalidConfig(
                "largeRegionReference must be positive".to_string(),
            ));
        }
        if self.magnitude_weight < 0.0
            || self.size_weight < 0.0
            || self.magnitude_weight + self.size_weight <= 0.0
        {
            return Err(DetectionError::InvalidConfig(
                "confidence weights must be non-negative with a positive sum".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(DetectionError::InvalidConfig(format!(
                "minConfidence must lie in [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Credentials for the imagery provider's OAuth client-credentials flow.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Process-level settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub sentinel_base_url: String,
    pub credentials: Option<ProviderCredentials>,
    pub window_days: u32,
    pub raster_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            sentinel_base_url: DEFAULT_SENTINEL_BASE_URL.to_string(),
            credentials: None,
            window_days: DEFAULT_WINDOW_DAYS,
            raster_size: DEFAULT_RASTER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let port = env::var("FORESTWATCH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let sentinel_base_url = env::var("SENTINEL_HUB_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_SENTINEL_BASE_URL.to_string());

        let credentials = match (
            env::var("SENTINEL_HUB_CLIENT_ID"),
            env::var("SENTINEL_HUB_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret))
                if !client_id.is_empty() && !client_secret.is_empty() =>
            {
                Some(ProviderCredentials {
                    client_id,
                    client_secret,
                })
            }
            _ => None,
        };

        let window_days = env::var("FORESTWATCH_WINDOW_DAYS")
            .ok()
            .and_then(|d| d.parse().ok())
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_WINDOW_DAYS);

        let raster_size = env::var("FORESTWATCH_RASTER_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|s| (1..=2500).contains(s))
            .unwrap_or(DEFAULT_RASTER_SIZE);

        Self {
            port,
            sentinel_base_url,
            credentials,
            window_days,
            raster_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.change_threshold, -0.15);
        assert_eq!(config.critical_threshold, -0.30);
        assert_eq!(config.moderate_threshold, -0.15);
        assert_eq!(config.min_region_pixels, 3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"minRegionPixels": 1, "criticalThreshold": -0.4}"#).unwrap();

        assert_eq!(config.min_region_pixels, 1);
        assert_eq!(config.critical_threshold, -0.4);
        assert_eq!(config.moderate_threshold, -0.15);
    }

    #[test]
    fn test_rejects_misordered_thresholds() {
        let config = DetectionConfig {
            critical_threshold: -0.1,
            moderate_threshold: -0.2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DetectionError::InvalidConfig(_))
        ));

        let positive = DetectionConfig {
            moderate_threshold: 0.1,
            ..Default::default()
        };
        assert!(positive.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_confidence_parameters() {
        let zero_weights = DetectionConfig {
            magnitude_weight: 0.0,
            size_weight: 0.0,
            ..Default::default()
        };
        assert!(zero_weights.validate().is_err());

        let zero_reference = DetectionConfig {
            large_region_reference: 0,
            ..Default::default()
        };
        assert!(zero_reference.validate().is_err());

        let gate = DetectionConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert!(gate.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = ProviderCredentials {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
