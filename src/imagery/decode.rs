//! Decoding provider TIFF responses into rasters.
//!
//! The provider returns a plain (non-geo) single-band TIFF; georeferencing
//! comes from the request's bounding box instead of GeoTIFF tags.

use std::io::Cursor;

use anyhow::{Context, bail};
use tiff::decoder::{Decoder, DecodingResult};

use crate::raster::{GeoTransform, RasterBuffer};

/// Decode a single-band TIFF into a raster with the given transform.
///
/// NaN samples are no-data. Integer sample types are widened to `f64`.
pub fn decode_tiff(
    bytes: &[u8],
    geo_transform: GeoTransform,
    no_data: Option<f64>,
) -> anyhow::Result<RasterBuffer> {
    let mut decoder = Decoder::new(Cursor::new(bytes)).context("not a readable TIFF")?;
    let (width, height) = decoder
        .dimensions()
        .context("TIFF is missing its dimensions")?;

    let values: Vec<f64> = match decoder.read_image().context("failed to read TIFF samples")? {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => bail!("unsupported TIFF sample type"),
    };

    let raster = RasterBuffer::new(
        width as usize,
        height as usize,
        values,
        geo_transform,
        no_data,
    )
    .context("TIFF is not a single-band raster")?;
    Ok(raster)
}
