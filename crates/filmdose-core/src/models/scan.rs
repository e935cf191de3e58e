//! Raw multichannel scan data.

use crate::error::{DoseError, DoseResult};

/// A scanned RGB image with integer channel intensities.
///
/// Samples are stored interleaved (`R, G, B, R, G, B, ...`) in row-major
/// order. 8-bit sources keep their native scale: `full_scale` records the
/// maximum representable intensity so that optical density is computed on
/// the source's own scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
    /// Maximum representable intensity (255 or 65535 for common scans).
    pub full_scale: u16,
    /// Physical pixel pitch in millimetres, when the source carries it.
    pub pixel_pitch_mm: Option<f64>,
}

impl ScannedImage {
    pub fn new(width: u32, height: u32, data: Vec<u16>, full_scale: u16) -> DoseResult<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(DoseError::InvalidShape(format!(
                "scan buffer holds {} samples, expected {} for {}x{} RGB",
                data.len(),
                expected,
                width,
                height
            )));
        }
        if full_scale == 0 {
            return Err(DoseError::InvalidShape(
                "full-scale intensity must be positive".to_string(),
            ));
        }
        Ok(Self {
            width,
            height,
            data,
            full_scale,
            pixel_pitch_mm: None,
        })
    }

    /// An image where every pixel has the same intensities.
    pub fn uniform(width: u32, height: u32, rgb: [u16; 3], full_scale: u16) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * 3);
        for _ in 0..pixel_count {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
            full_scale,
            pixel_pitch_mm: None,
        }
    }

    pub fn with_pixel_pitch(mut self, pitch_mm: f64) -> Self {
        self.pixel_pitch_mm = Some(pitch_mm);
        self
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u16; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Copy the sub-grid `[top, top + height) x [left, left + width)`.
    ///
    /// The caller guarantees the rectangle lies inside the image.
    pub fn crop(&self, left: u32, top: u32, width: u32, height: u32) -> ScannedImage {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        let stride = self.width as usize * 3;
        for row in top..top + height {
            let start = row as usize * stride + left as usize * 3;
            let end = start + width as usize * 3;
            data.extend_from_slice(&self.data[start..end]);
        }
        ScannedImage {
            width,
            height,
            data,
            full_scale: self.full_scale,
            pixel_pitch_mm: self.pixel_pitch_mm,
        }
    }

    /// Per-channel mean intensity.
    pub fn channel_means(&self) -> [f64; 3] {
        let mut sums = [0.0f64; 3];
        for px in self.data.chunks_exact(3) {
            sums[0] += px[0] as f64;
            sums[1] += px[1] as f64;
            sums[2] += px[2] as f64;
        }
        let n = self.pixel_count().max(1) as f64;
        [sums[0] / n, sums[1] / n, sums[2] / n]
    }
}
