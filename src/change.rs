//! Per-pixel NDVI differencing.

use crate::error::{DetectionError, Result};
use crate::raster::RasterBuffer;

/// Per-pixel change between two rasters, `NaN` where either source is no-data.
#[derive(Debug, Clone)]
pub struct ChangeRaster {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl ChangeRaster {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Change at a flat index, `None` for no-data.
    pub fn get(&self, idx: usize) -> Option<f64> {
        self.values.get(idx).copied().filter(|v| !v.is_nan())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of pixels valid in both sources.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Compute `recent - past` for every pixel.
///
/// The subtraction is order-sensitive: with rasters passed past-then-recent,
/// negative values mean vegetation decline.
pub fn compute_change(past: &RasterBuffer, recent: &RasterBuffer) -> Result<ChangeRaster> {
    if past.width() != recent.width() || past.height() != recent.height() {
        return Err(DetectionError::DimensionMismatch {
            a_width: past.width(),
            a_height: past.height(),
            b_width: recent.width(),
            b_height: recent.height(),
        });
    }

    let values = (0..past.len())
        .map(|idx| match (past.sample_at(idx), recent.sample_at(idx)) {
            (Some(a), Some(b)) => b - a,
            _ => f64::NAN,
        })
        .collect();

    Ok(ChangeRaster {
        width: past.width(),
        height: past.height(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    fn raster(width: usize, height: usize, values: Vec<f64>) -> RasterBuffer {
        RasterBuffer::new(width, height, values, GeoTransform::default(), Some(-1.0)).unwrap()
    }

    #[test]
    fn test_change_is_recent_minus_past() {
        let past = raster(2, 1, vec![0.8, 0.2]);
        let recent = raster(2, 1, vec![0.3, 0.5]);

        let change = compute_change(&past, &recent).unwrap();

        assert_relative_eq!(change.get(0).unwrap(), -0.5, epsilon = 1e-12);
        assert_relative_eq!(change.get(1).unwrap(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_no_data_in_either_source_propagates() {
        let past = raster(3, 1, vec![-1.0, 0.5, f64::NAN]);
        let recent = raster(3, 1, vec![0.1, -1.0, 0.2]);

        let change = compute_change(&past, &recent).unwrap();

        assert_eq!(change.get(0), None);
        assert_eq!(change.get(1), None);
        assert_eq!(change.get(2), None);
        assert_eq!(change.valid_count(), 0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let past = raster(2, 2, vec![0.0; 4]);
        let recent = raster(4, 1, vec![0.0; 4]);

        assert_eq!(
            compute_change(&past, &recent).unwrap_err(),
            DetectionError::DimensionMismatch {
                a_width: 2,
                a_height: 2,
                b_width: 4,
                b_height: 1
            }
        );
    }
}
