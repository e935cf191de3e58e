//! TIFF scan decoder

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::{full_scale_for_bits, to_rgb};
use crate::error::{DoseError, DoseResult};
use crate::models::ScannedImage;

const MM_PER_INCH: f64 = 25.4;
const MM_PER_CM: f64 = 10.0;

// TIFF ResolutionUnit codes.
const UNIT_NONE: u32 = 1;
const UNIT_INCH: u32 = 2;
const UNIT_CENTIMETER: u32 = 3;

fn decode_err(context: &str, e: impl std::fmt::Display) -> DoseError {
    DoseError::Decode(format!("{}: {}", context, e))
}

fn rational_value(value: Value) -> Option<f64> {
    match value {
        Value::Rational(n, d) if d != 0 => Some(n as f64 / d as f64),
        Value::Float(v) => Some(v as f64),
        Value::Double(v) => Some(v),
        Value::Short(v) => Some(v as f64),
        Value::Unsigned(v) => Some(v as f64),
        _ => None,
    }
}

/// Pixel pitch in millimetres from `XResolution`/`ResolutionUnit`.
///
/// A missing unit means inches. Unit "none" or a zero resolution yields
/// `None`.
pub(crate) fn pitch_from_resolution(pixels_per_unit: f64, unit: u32) -> Option<f64> {
    if !(pixels_per_unit.is_finite() && pixels_per_unit > 0.0) {
        return None;
    }
    match unit {
        UNIT_INCH => Some(MM_PER_INCH / pixels_per_unit),
        UNIT_CENTIMETER => Some(MM_PER_CM / pixels_per_unit),
        UNIT_NONE => None,
        _ => None,
    }
}

fn read_pixel_pitch<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let resolution = decoder
        .find_tag(Tag::XResolution)
        .ok()
        .flatten()
        .and_then(rational_value)?;
    let unit = match decoder.find_tag(Tag::ResolutionUnit).ok().flatten() {
        Some(Value::Short(u)) => u as u32,
        Some(Value::Unsigned(u)) => u,
        _ => UNIT_INCH,
    };
    pitch_from_resolution(resolution, unit)
}

/// Decode an 8- or 16-bit gray, RGB or RGBA TIFF.
pub(crate) fn decode_tiff<P: AsRef<Path>>(path: P) -> DoseResult<ScannedImage> {
    let file = File::open(path.as_ref()).map_err(|e| decode_err("failed to open TIFF file", e))?;

    // Film scans at 1200+ dpi exceed the default buffer limits.
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;

    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| decode_err("failed to create TIFF decoder", e))?
        .with_limits(limits);

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| decode_err("failed to read TIFF dimensions", e))?;
    let color_type = decoder
        .colortype()
        .map_err(|e| decode_err("failed to read TIFF color type", e))?;

    let samples_per_pixel = match color_type {
        tiff::ColorType::Gray(_) => 1,
        tiff::ColorType::GrayA(_) => 2,
        tiff::ColorType::RGB(_) => 3,
        tiff::ColorType::RGBA(_) => 4,
        other => {
            return Err(DoseError::Decode(format!(
                "unsupported TIFF color type: {:?}",
                other
            )))
        }
    };

    let pixel_pitch_mm = read_pixel_pitch(&mut decoder);

    let image_data = decoder
        .read_image()
        .map_err(|e| decode_err("failed to read TIFF image data", e))?;

    let (data, full_scale) = match image_data {
        DecodingResult::U8(buf) => {
            let rgb = to_rgb(&buf, samples_per_pixel, width, height)?;
            (
                rgb.into_iter().map(u16::from).collect(),
                full_scale_for_bits(8)?,
            )
        }
        DecodingResult::U16(buf) => (
            to_rgb(&buf, samples_per_pixel, width, height)?,
            full_scale_for_bits(16)?,
        ),
        _ => {
            return Err(DoseError::Decode(
                "only 8- and 16-bit integer TIFF scans are supported".to_string(),
            ))
        }
    };

    let image = ScannedImage::new(width, height, data, full_scale)?;
    Ok(match pixel_pitch_mm {
        Some(pitch) => image.with_pixel_pitch(pitch),
        None => image,
    })
}
