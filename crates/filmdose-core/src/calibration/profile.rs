//! Line profile along the calibration strip.

use crate::error::{DoseError, DoseResult};
use crate::interp::LinearInterpolant;
use crate::models::{OpticalDensityImage, RegionLabel, ScannedImage};

/// Per-channel optical density sampled along the strip's long axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityProfile {
    /// Sample positions in cm from the strip's first pixel.
    pub positions_cm: Vec<f64>,
    /// Mean density across the profile band at each position.
    pub densities: Vec<[f64; 3]>,
}

impl DensityProfile {
    /// One interpolant per channel over position.
    pub fn interpolants(&self) -> DoseResult<[LinearInterpolant; 3]> {
        let channel = |c: usize| {
            LinearInterpolant::new(
                self.positions_cm.clone(),
                self.densities.iter().map(|d| d[c]).collect(),
            )
        };
        Ok([channel(0)?, channel(1)?, channel(2)?])
    }
}

/// Average a centered band of `band_width` pixels across the strip.
///
/// The profile runs down the rows when the strip is at least as tall as it
/// is wide, and along the columns otherwise. Non-finite densities are left
/// out of each average; a position with no finite pixel stays NaN and is
/// dropped by the interpolant.
pub fn density_profile(
    image: &ScannedImage,
    band_width: u32,
    pixel_pitch_mm: f64,
) -> DoseResult<DensityProfile> {
    if image.is_empty() {
        return Err(DoseError::EmptyRegion {
            label: RegionLabel::Calibration,
        });
    }
    if !(pixel_pitch_mm.is_finite() && pixel_pitch_mm > 0.0) {
        return Err(DoseError::config(format!(
            "pixel pitch must be positive, got {}",
            pixel_pitch_mm
        )));
    }

    let density = OpticalDensityImage::from_scan(image);
    let vertical = image.height >= image.width;
    let (long, short) = if vertical {
        (image.height, image.width)
    } else {
        (image.width, image.height)
    };
    let band = band_width.clamp(1, short);
    let start = (short - band) / 2;

    let pitch_cm = pixel_pitch_mm / 10.0;
    let mut positions_cm = Vec::with_capacity(long as usize);
    let mut densities = Vec::with_capacity(long as usize);

    for i in 0..long {
        let mut sums = [0.0f64; 3];
        let mut counts = [0u32; 3];
        for k in start..start + band {
            let (x, y) = if vertical { (k, i) } else { (i, k) };
            let px = density.get(x, y);
            for c in 0..3 {
                if px[c].is_finite() {
                    sums[c] += px[c];
                    counts[c] += 1;
                }
            }
        }
        let mut mean = [f64::NAN; 3];
        for c in 0..3 {
            if counts[c] > 0 {
                mean[c] = sums[c] / counts[c] as f64;
            }
        }
        positions_cm.push(i as f64 * pitch_cm);
        densities.push(mean);
    }

    Ok(DensityProfile {
        positions_cm,
        densities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_strip_profile_follows_rows() {
        // 4 wide, 6 tall; intensity falls with row index
        let mut data = Vec::new();
        for y in 0..6u16 {
            for _ in 0..4 {
                let v = 60000 - y * 5000;
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let image = ScannedImage::new(4, 6, data, 65535).unwrap();
        let profile = density_profile(&image, 2, 0.5).unwrap();
        assert_eq!(profile.positions_cm.len(), 6);
        assert!((profile.positions_cm[2] - 0.1).abs() < 1e-12);
        for w in profile.densities.windows(2) {
            assert!(w[1][0] > w[0][0]);
        }
    }

    #[test]
    fn test_horizontal_strip_profile_follows_columns() {
        let image = ScannedImage::uniform(10, 3, [30000, 30000, 30000], 65535);
        let profile = density_profile(&image, 50, 1.0).unwrap();
        assert_eq!(profile.positions_cm.len(), 10);
        assert!((profile.positions_cm[9] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_zero_pixels_are_skipped() {
        let mut image = ScannedImage::uniform(3, 5, [30000, 30000, 30000], 65535);
        // zero intensity in the middle column of row 0, red only
        image.data[3] = 0;
        let profile = density_profile(&image, 3, 1.0).unwrap();
        let expected = (65535.0f64 / 30000.0).log10();
        assert!((profile.densities[0][0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_empty_strip_is_an_error() {
        let image = ScannedImage::uniform(0, 0, [0, 0, 0], 65535);
        assert!(matches!(
            density_profile(&image, 3, 1.0),
            Err(DoseError::EmptyRegion {
                label: RegionLabel::Calibration
            })
        ));
    }
}
