//! PNG scan decoder

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{full_scale_for_bits, to_rgb};
use crate::error::{DoseError, DoseResult};
use crate::models::ScannedImage;

fn decode_err(context: &str, e: impl std::fmt::Display) -> DoseError {
    DoseError::Decode(format!("{}: {}", context, e))
}

/// Decode an 8- or 16-bit gray, gray+alpha, RGB or RGBA PNG.
///
/// A `pHYs` chunk in pixels per metre supplies the pixel pitch.
pub(crate) fn decode_png<P: AsRef<Path>>(path: P) -> DoseResult<ScannedImage> {
    let file = File::open(path.as_ref()).map_err(|e| decode_err("failed to open PNG file", e))?;
    let decoder = png::Decoder::new(BufReader::new(file));
    let mut reader = decoder
        .read_info()
        .map_err(|e| decode_err("failed to read PNG info", e))?;

    let info = reader.info();
    let width = info.width;
    let height = info.height;
    let pixel_pitch_mm = info.pixel_dims.and_then(|dims| match dims.unit {
        png::Unit::Meter if dims.xppu > 0 => Some(1000.0 / dims.xppu as f64),
        _ => None,
    });
    let (color_type, bit_depth) = reader.output_color_type();

    let samples_per_pixel = match color_type {
        png::ColorType::Grayscale => 1,
        png::ColorType::GrayscaleAlpha => 2,
        png::ColorType::Rgb => 3,
        png::ColorType::Rgba => 4,
        png::ColorType::Indexed => {
            return Err(DoseError::Decode(
                "indexed PNG scans are not supported".to_string(),
            ))
        }
    };

    let buffer_size = reader
        .output_buffer_size()
        .ok_or_else(|| DoseError::Decode("failed to determine PNG buffer size".to_string()))?;
    let mut buf = vec![0u8; buffer_size];
    let frame_info = reader
        .next_frame(&mut buf)
        .map_err(|e| decode_err("failed to read PNG frame", e))?;
    let bytes = &buf[..frame_info.buffer_size()];

    let (samples, full_scale): (Vec<u16>, u16) = match bit_depth {
        png::BitDepth::Eight => (
            bytes.iter().map(|&v| u16::from(v)).collect(),
            full_scale_for_bits(8)?,
        ),
        // 16-bit PNG samples are big-endian.
        png::BitDepth::Sixteen => (
            bytes
                .chunks_exact(2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .collect(),
            full_scale_for_bits(16)?,
        ),
        other => {
            return Err(DoseError::Decode(format!(
                "unsupported PNG bit depth: {:?}",
                other
            )))
        }
    };

    let data = to_rgb(&samples, samples_per_pixel, width, height)?;
    let image = ScannedImage::new(width, height, data, full_scale)?;
    Ok(match pixel_pitch_mm {
        Some(pitch) => image.with_pixel_pitch(pitch),
        None => image,
    })
}
