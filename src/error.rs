//! Error taxonomy for the change-detection engine.
//!
//! `ShapeMismatch`, `DimensionMismatch`, `OutOfRange` and `InvalidConfig` are
//! caller-input errors: they abort a detection immediately with no partial
//! result. `AnomalousRegion` describes a single bad region; the alert builder
//! logs it and keeps going instead of failing the batch.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("raster has {actual} samples but {width}x{height} requires {expected}")]
    ShapeMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("raster must have positive dimensions, got {width}x{height}")]
    EmptyRaster { width: usize, height: usize },

    #[error("invalid geotransform: {0}")]
    InvalidGeoTransform(String),

    #[error("rasters differ in size: {a_width}x{a_height} vs {b_width}x{b_height}")]
    DimensionMismatch {
        a_width: usize,
        a_height: usize,
        b_width: usize,
        b_height: usize,
    },

    #[error("pixel ({col}, {row}) is outside the {width}x{height} grid")]
    OutOfRange {
        col: usize,
        row: usize,
        width: usize,
        height: usize,
    },

    #[error("anomalous region seeded at pixel {seed}: {reason}")]
    AnomalousRegion { seed: usize, reason: String },

    #[error("invalid detection config: {0}")]
    InvalidConfig(String),
}

impl DetectionError {
    /// True for errors caused by the caller's rasters or config.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, DetectionError::AnomalousRegion { .. })
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;
