//! Optical density images.

use super::scan::ScannedImage;

/// Per-channel optical density, `log10(full_scale / intensity)`.
///
/// Zero-intensity samples have no defined density and are stored as NaN;
/// consumers filter non-finite values before fitting or inverting.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticalDensityImage {
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB densities, row-major.
    pub data: Vec<f64>,
}

/// Density of a single intensity sample on a given scale.
#[inline]
pub fn intensity_to_density(intensity: f64, full_scale: f64) -> f64 {
    if intensity > 0.0 {
        (full_scale / intensity).log10()
    } else {
        f64::NAN
    }
}

impl OpticalDensityImage {
    pub fn from_scan(scan: &ScannedImage) -> Self {
        let full_scale = scan.full_scale as f64;
        let data = scan
            .data
            .iter()
            .map(|&v| intensity_to_density(v as f64, full_scale))
            .collect();
        Self {
            width: scan.width,
            height: scan.height,
            data,
        }
    }

    /// An image with the same density triple at every pixel.
    pub fn uniform(width: u32, height: u32, densities: [f64; 3]) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * 3);
        for _ in 0..pixel_count {
            data.extend_from_slice(&densities);
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f64; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// All pixels of column `x`, top to bottom.
    pub fn column(&self, x: u32) -> Vec<[f64; 3]> {
        (0..self.height).map(|y| self.get(x, y)).collect()
    }
}
