//! Imagery acquisition: request types, the Sentinel Hub client, and decoding
//! of the provider's raster responses.
//!
//! Everything here happens before detection. The engine only ever sees the
//! decoded [`RasterBuffer`](crate::raster::RasterBuffer)s.
//!
//! - [`sentinel`]: OAuth token exchange, Process API and Catalog API calls
//! - [`decode`]: single-band float TIFF to raster

pub mod decode;
pub mod sentinel;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::raster::GeoTransform;

pub use sentinel::SentinelHubClient;

/// Kilometres per degree, used for the coarse area estimate.
const KM_PER_DEGREE: f64 = 111.32;

/// Largest area accepted for one analysis.
pub const MAX_AREA_KM2: f64 = 10_000.0;

/// Tokens are refreshed this long before the provider says they expire.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;

/// A WGS84 bounding box, validated once at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Build and validate from `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn new(coords: [f64; 4]) -> Result<Self, BboxError> {
        let bbox = Self {
            min_lon: coords[0],
            min_lat: coords[1],
            max_lon: coords[2],
            max_lat: coords[3],
        };
        let errors = bbox.violations();
        if errors.is_empty() {
            Ok(bbox)
        } else {
            Err(BboxError(errors))
        }
    }

    /// Every rule this box breaks, empty if valid.
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let coords = self.to_array();

        if coords.iter().any(|c| !c.is_finite()) {
            errors.push("Coordinates must be finite numbers".to_string());
            return errors;
        }
        if self.min_lon >= self.max_lon {
            errors.push("min_longitude must be less than max_longitude".to_string());
        }
        if self.min_lat >= self.max_lat {
            errors.push("min_latitude must be less than max_latitude".to_string());
        }
        if !((-180.0..=180.0).contains(&self.min_lon) && (-180.0..=180.0).contains(&self.max_lon))
        {
            errors.push("Longitude values must be between -180 and 180".to_string());
        }
        if !((-90.0..=90.0).contains(&self.min_lat) && (-90.0..=90.0).contains(&self.max_lat)) {
            errors.push("Latitude values must be between -90 and 90".to_string());
        }
        let area = self.area_km2();
        if area > MAX_AREA_KM2 {
            errors.push(format!(
                "Area too large ({:.1} km²). Maximum recommended area is {} km²",
                area, MAX_AREA_KM2
            ));
        }
        errors
    }

    /// Approximate area, treating a degree as 111.32 km on both axes.
    pub fn area_km2(&self) -> f64 {
        ((self.max_lon - self.min_lon) * (self.max_lat - self.min_lat)).abs()
            * KM_PER_DEGREE
            * KM_PER_DEGREE
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    /// North-up transform for a `width` x `height` raster covering this box.
    pub fn geo_transform(&self, width: usize, height: usize) -> GeoTransform {
        GeoTransform::from_bounds(
            self.min_lon,
            self.min_lat,
            self.max_lon,
            self.max_lat,
            width,
            height,
        )
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = BboxError;

    fn try_from(coords: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(coords)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

/// Parses the comma form `"minLon,minLat,maxLon,maxLat"`.
impl FromStr for BoundingBox {
    type Err = BboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| {
                BboxError(vec![
                    "Bounding box must be \"minX,minY,maxX,maxY\" with numeric values".to_string(),
                ])
            })?;
        let coords: [f64; 4] = parts.try_into().map_err(|_| {
            BboxError(vec![
                "Coordinates must contain exactly 4 values: [min_lon, min_lat, max_lon, max_lat]"
                    .to_string(),
            ])
        })?;
        Self::new(coords)
    }
}

/// All the reasons a bounding box was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct BboxError(pub Vec<String>);

impl fmt::Display for BboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bounding box: {}", self.0.join("; "))
    }
}

impl std::error::Error for BboxError {}

/// An inclusive acquisition window in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl TimeWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// Two back-to-back windows of `days` each ending at `today`,
    /// returned as `(past, recent)`.
    pub fn consecutive(today: NaiveDate, days: u32) -> (Self, Self) {
        let span = Duration::days(i64::from(days));
        let recent = Self {
            from: today - span,
            to: today,
        };
        let past = Self {
            from: recent.from - span,
            to: recent.from,
        };
        (past, recent)
    }

    /// RFC 3339 bounds covering the whole first and last day.
    pub fn rfc3339_bounds(&self) -> (String, String) {
        (
            format!("{}T00:00:00Z", self.from.format("%Y-%m-%d")),
            format!("{}T23:59:59Z", self.to.format("%Y-%m-%d")),
        )
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}

/// Band math run by the provider for each output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evalscript {
    /// Single FLOAT32 NDVI band, NaN where the scene has no data.
    NdviData,
    /// Stretched RGB for display.
    TrueColor,
    /// NDVI through a colour ramp for display.
    NdviVisual,
}

impl Evalscript {
    pub fn source(&self) -> &'static str {
        match self {
            Evalscript::NdviData => NDVI_DATA_EVALSCRIPT,
            Evalscript::TrueColor => TRUE_COLOR_EVALSCRIPT,
            Evalscript::NdviVisual => NDVI_VISUAL_EVALSCRIPT,
        }
    }

    /// MIME type the provider should answer with.
    pub fn output_format(&self) -> &'static str {
        match self {
            Evalscript::NdviData => "image/tiff",
            Evalscript::TrueColor | Evalscript::NdviVisual => "image/png",
        }
    }
}

const NDVI_DATA_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: ["B04", "B08", "dataMask"],
    output: { bands: 1, sampleType: "FLOAT32" }
  };
}
function evaluatePixel(sample) {
  if (sample.dataMask === 0) {
    return [NaN];
  }
  return [(sample.B08 - sample.B04) / (sample.B08 + sample.B04 + 1e-6)];
}
"#;

const TRUE_COLOR_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: ["B04", "B03", "B02"],
    output: { bands: 3 }
  };
}
function stretch(value) {
  return Math.min(Math.max(value / 0.4, 0), 1);
}
function evaluatePixel(sample) {
  return [stretch(sample.B04), stretch(sample.B03), stretch(sample.B02)];
}
"#;

const NDVI_VISUAL_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: ["B04", "B08"],
    output: { bands: 3 }
  };
}
const ramp = [
  [-1.0, 0x000000],
  [-0.2, 0xa52a2a],
  [0.0, 0xffff00],
  [0.2, 0xadff2f],
  [0.4, 0x008000],
  [0.6, 0x006400],
  [0.8, 0x004000],
  [1.0, 0x002000]
];
const visualizer = new ColorRampVisualizer(ramp);
function evaluatePixel(sample) {
  return visualizer.process((sample.B08 - sample.B04) / (sample.B08 + sample.B04));
}
"#;

/// Which scene wins where several cover the same pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MosaickingOrder {
    #[default]
    #[serde(rename = "leastCC")]
    LeastCloudCoverage,
    #[serde(rename = "mostRecent")]
    MostRecent,
}

/// One raster request against the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub bbox: BoundingBox,
    pub window: TimeWindow,
    pub evalscript: Evalscript,
    pub mosaicking: MosaickingOrder,
    pub max_cloud_coverage: u8,
    pub width: u32,
    pub height: u32,
}

impl FetchRequest {
    /// NDVI data request with least-cloud mosaicking and a 30% cloud cap.
    pub fn ndvi(bbox: BoundingBox, window: TimeWindow, size: u32) -> Self {
        Self {
            bbox,
            window,
            evalscript: Evalscript::NdviData,
            mosaicking: MosaickingOrder::LeastCloudCoverage,
            max_cloud_coverage: 30,
            width: size,
            height: size,
        }
    }
}

/// A bearer token together with the instant it stops being usable.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Token issued at `issued_at`, valid for `expires_in_secs` minus a
    /// five-minute safety margin.
    pub fn new(value: String, issued_at: DateTime<Utc>, expires_in_secs: i64) -> Self {
        let lifetime = (expires_in_secs - TOKEN_EXPIRY_MARGIN_SECS).max(0);
        Self {
            value,
            expires_at: issued_at + Duration::seconds(lifetime),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bbox_valid() {
        let bbox = BoundingBox::new([-60.1, -3.1, -60.0, -3.0]).unwrap();
        assert!(bbox.area_km2() < 200.0);
    }

    #[test]
    fn test_bbox_collects_all_violations() {
        let err = BoundingBox::new([10.0, 95.0, 5.0, 91.0]).unwrap_err();
        assert!(err.0.iter().any(|e| e.contains("min_longitude")));
        assert!(err.0.iter().any(|e| e.contains("min_latitude")));
        assert!(err.0.iter().any(|e| e.contains("Latitude")));
    }

    #[test]
    fn test_bbox_rejects_large_area() {
        let err = BoundingBox::new([0.0, 0.0, 2.0, 2.0]).unwrap_err();
        assert!(err.0[0].contains("Area too large"));
    }

    #[test]
    fn test_bbox_from_comma_string() {
        let bbox: BoundingBox = "-60.1, -3.1,-60.0,-3.0".parse().unwrap();
        assert_eq!(bbox.to_array(), [-60.1, -3.1, -60.0, -3.0]);

        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn test_bbox_json_array_form() {
        let bbox: BoundingBox = serde_json::from_str("[-60.1,-3.1,-60.0,-3.0]").unwrap();
        assert_eq!(serde_json::to_string(&bbox).unwrap(), "[-60.1,-3.1,-60.0,-3.0]");
        assert!(serde_json::from_str::<BoundingBox>("[1,1,0,0]").is_err());
    }

    #[test]
    fn test_consecutive_windows() {
        let (past, recent) = TimeWindow::consecutive(date(2024, 3, 31), 30);

        assert_eq!(recent.to, date(2024, 3, 31));
        assert_eq!(recent.from, date(2024, 3, 1));
        assert_eq!(past.to, date(2024, 3, 1));
        assert_eq!(past.from, date(2024, 1, 31));
        assert_eq!(
            recent.rfc3339_bounds(),
            (
                "2024-03-01T00:00:00Z".to_string(),
                "2024-03-31T23:59:59Z".to_string()
            )
        );
    }

    #[test]
    fn test_time_window_rejects_inverted() {
        assert!(TimeWindow::new(date(2024, 2, 1), date(2024, 1, 1)).is_none());
    }

    #[test]
    fn test_access_token_expiry_margin() {
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let token = AccessToken::new("secret".to_string(), issued, 3600);

        assert!(token.is_valid_at(issued + Duration::seconds(3299)));
        assert!(!token.is_valid_at(issued + Duration::seconds(3300)));
        assert!(!format!("{:?}", token).contains("secret"));
    }

    #[test]
    fn test_ndvi_request_defaults() {
        let bbox = BoundingBox::new([-60.1, -3.1, -60.0, -3.0]).unwrap();
        let (_, recent) = TimeWindow::consecutive(date(2024, 3, 31), 30);
        let request = FetchRequest::ndvi(bbox, recent, 256);

        assert_eq!(request.evalscript, Evalscript::NdviData);
        assert_eq!(request.evalscript.output_format(), "image/tiff");
        assert!(request.evalscript.source().contains("FLOAT32"));
        assert_eq!(request.mosaicking, MosaickingOrder::LeastCloudCoverage);
    }
}
