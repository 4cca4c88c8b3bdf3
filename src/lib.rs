//! ForestWatch - change detection and alert clustering for NDVI rasters.
//!
//! # Overview
//!
//! Given two co-registered NDVI rasters of the same area, ForestWatch finds
//! spatially connected regions where vegetation dropped, scores each region,
//! and returns georeferenced alerts ranked most severe first.
//!
//! The pipeline is a straight line:
//!
//! 1. [`change::compute_change`]: per-pixel `recent - past`, no-data propagated
//! 2. [`mask::threshold`]: pixels at or below the change threshold
//! 3. [`cluster::RegionClusterer`]: 4-connected regions in scan order
//! 4. [`alert::AlertBuilder`]: noise suppression, severity, confidence, geolocation
//!
//! [`engine::detect`] runs all four. Identical inputs always yield identical
//! alerts.
//!
//! # Modules
//!
//! - [`raster`]: rasters and the affine pixel-to-geo transform
//! - [`config`]: detection parameters and server settings
//! - [`error`]: the engine's error type
//! - [`imagery`]: Sentinel Hub client and TIFF decoding
//! - [`analysis`]: fetch two windows and detect
//! - [`model`]: HTTP request/response types
//! - [`api`]: HTTP API handlers

pub mod alert;
pub mod analysis;
pub mod api;
pub mod change;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod imagery;
pub mod mask;
pub mod model;
pub mod raster;

pub use engine::detect;
pub use error::DetectionError;
