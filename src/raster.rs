//! Single-band raster container and its affine georeferencing.

use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Affine mapping from pixel grid coordinates to longitude/latitude.
///
/// ```text
/// lon = origin_x + col * pixel_width + row * row_rotation
/// lat = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// North-up rasters have zero rotation and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a transform with no rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// Create from GDAL coefficient order
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// North-up transform covering `[min_lon, max_lon] x [min_lat, max_lat]`
    /// with `width` x `height` pixels. Row 0 is the northern edge.
    pub fn from_bounds(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self::new(
            min_lon,
            max_lat,
            (max_lon - min_lon) / width as f64,
            -(max_lat - min_lat) / height as f64,
        )
    }

    /// Apply the affine mapping to fractional grid coordinates.
    pub fn apply(&self, col: f64, row: f64) -> GeoPoint {
        GeoPoint {
            lon: self.origin_x + col * self.pixel_width + row * self.row_rotation,
            lat: self.origin_y + col * self.col_rotation + row * self.pixel_height,
        }
    }

    /// Geographic position of the center of pixel `(col, row)`.
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> GeoPoint {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Geographic position of the top-left corner of pixel `(col, row)`.
    pub fn pixel_corner_to_geo(&self, col: usize, row: usize) -> GeoPoint {
        self.apply(col as f64, row as f64)
    }

    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0 && self.pixel_height < 0.0
    }

    fn validate(&self) -> Result<()> {
        let coeffs = self.to_gdal();
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(DetectionError::InvalidGeoTransform(format!(
                "non-finite coefficient in {:?}",
                coeffs
            )));
        }
        if self.pixel_width <= 0.0 {
            return Err(DetectionError::InvalidGeoTransform(format!(
                "pixel width must be positive, got {}",
                self.pixel_width
            )));
        }
        if self.pixel_height == 0.0 {
            return Err(DetectionError::InvalidGeoTransform(
                "pixel height must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// An immutable single-band float raster with optional no-data sentinel.
///
/// Samples are stored row-major. NaN samples are always no-data, in
/// addition to any sample equal to `no_data`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RasterPayload")]
pub struct RasterBuffer {
    width: usize,
    height: usize,
    values: Vec<f64>,
    geo_transform: GeoTransform,
    no_data: Option<f64>,
}

impl RasterBuffer {
    /// Build a raster, rejecting sample vectors that do not fill the grid.
    pub fn new(
        width: usize,
        height: usize,
        values: Vec<f64>,
        geo_transform: GeoTransform,
        no_data: Option<f64>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyRaster { width, height });
        }
        let expected = width.checked_mul(height).ok_or(DetectionError::EmptyRaster {
            width,
            height,
        })?;
        if values.len() != expected {
            return Err(DetectionError::ShapeMismatch {
                width,
                height,
                expected,
                actual: values.len(),
            });
        }
        geo_transform.validate()?;

        Ok(Self {
            width,
            height,
            values,
            geo_transform,
            no_data,
        })
    }

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

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    /// True if `value` must be excluded from computation.
    pub fn is_no_data(&self, value: f64) -> bool {
        value.is_nan() || self.no_data.is_some_and(|nd| value == nd)
    }

    /// Sample at `(col, row)`; `Ok(None)` for no-data pixels.
    pub fn sample(&self, col: usize, row: usize) -> Result<Option<f64>> {
        let idx = self.index(col, row)?;
        let value = self.values[idx];
        Ok((!self.is_no_data(value)).then_some(value))
    }

    /// Sample by flat row-major index; `None` for no-data pixels.
    pub(crate) fn sample_at(&self, idx: usize) -> Option<f64> {
        let value = self.values[idx];
        (!self.is_no_data(value)).then_some(value)
    }

    /// Row-major index of `(col, row)`.
    pub fn index(&self, col: usize, row: usize) -> Result<usize> {
        if col >= self.width || row >= self.height {
            return Err(DetectionError::OutOfRange {
                col,
                row,
                width: self.width,
                height: self.height,
            });
        }
        Ok(row * self.width + col)
    }

    /// Geographic position of the center of pixel `(col, row)`.
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> GeoPoint {
        self.geo_transform.pixel_to_geo(col, row)
    }

    /// Number of pixels that carry a valid sample.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !self.is_no_data(**v)).count()
    }
}

/// Wire form of a raster. `null` samples decode as no-data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RasterPayload {
    width: usize,
    height: usize,
    values: Vec<Option<f64>>,
    geo_transform: [f64; 6],
    #[serde(default)]
    no_data_value: Option<f64>,
}

impl TryFrom<RasterPayload> for RasterBuffer {
    type Error = DetectionError;

    fn try_from(payload: RasterPayload) -> Result<Self> {
        let values = payload
            .values
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        RasterBuffer::new(
            payload.width,
            payload.height,
            values,
            GeoTransform::from_gdal(payload.geo_transform),
            payload.no_data_value,
        )
    }
}
