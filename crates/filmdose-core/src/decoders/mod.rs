//! Scan decoders
//!
//! Flatbed film scans arrive as TIFF (the usual case) or PNG. Both decode
//! into a [`ScannedImage`] holding raw integer samples, so optical density
//! is computed against the file's own full-scale value.

mod png;
mod tiff;


use std::path::Path;

use crate::error::{DoseError, DoseResult};
use crate::models::ScannedImage;

/// Full-scale sample value for a bit depth.
pub(crate) fn full_scale_for_bits(bits: u8) -> DoseResult<u16> {
    match bits {
        8 => Ok(u8::MAX as u16),
        16 => Ok(u16::MAX),
        other => Err(DoseError::Decode(format!(
            "unsupported sample depth: {} bits",
            other
        ))),
    }
}

/// Expand gray or drop alpha so every pixel carries exactly three samples.
pub(crate) fn to_rgb<T: Copy>(
    buf: &[T],
    samples_per_pixel: usize,
    width: u32,
    height: u32,
) -> DoseResult<Vec<T>> {
    let pixels = width as usize * height as usize;
    if buf.len() != pixels * samples_per_pixel {
        return Err(DoseError::Decode(format!(
            "buffer size mismatch: expected {}, got {}",
            pixels * samples_per_pixel,
            buf.len()
        )));
    }
    let mut rgb = Vec::with_capacity(pixels * 3);
    match samples_per_pixel {
        1 | 2 => {
            for px in buf.chunks_exact(samples_per_pixel) {
                rgb.extend_from_slice(&[px[0], px[0], px[0]]);
            }
        }
        3 => rgb.extend_from_slice(buf),
        4 => {
            for px in buf.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
            }
        }
        other => {
            return Err(DoseError::Decode(format!(
                "unsupported sample count per pixel: {}",
                other
            )))
        }
    }
    Ok(rgb)
}

/// Decode a scan, dispatching on the file extension.
pub fn decode_scan<P: AsRef<Path>>(path: P) -> DoseResult<ScannedImage> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| DoseError::Decode(format!("{}: no file extension", path.display())))?;

    match extension.as_str() {
        "tif" | "tiff" => tiff::decode_tiff(path),
        "png" => png::decode_png(path),
        _ => Err(DoseError::Decode(format!(
            "unsupported file format: {}",
            extension
        ))),
    }
}
