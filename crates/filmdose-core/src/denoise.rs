//! Joint-channel non-local means denoising
//!
//! Each pixel becomes a weighted average of the pixels in a square search
//! window. The weight of a candidate is `exp(-dist² / h²)` where `dist²` is
//! the mean squared difference between the two surrounding patches taken
//! over all three channels at once, so every channel receives the same
//! weights and no chromatic fringes are introduced. Borders are handled by
//! mirror reflection. Intensities are normalized to `[0, 1]` by the scan's
//! full-scale value, so `h` is independent of bit depth, and the result is
//! re-quantized to the source scale.

use crate::config::DenoiseConfig;
use crate::error::{DoseError, DoseResult};
use crate::models::ScannedImage;
use crate::parallel::{self, ExecutionMode};
use crate::verbose_println;

/// Filter parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlmParams {
    /// Patch side length. Even sizes are widened by one.
    pub patch_size: u32,
    pub search_radius: u32,
    /// Strength `h` in normalized intensity units.
    pub strength: f64,
}

impl From<&DenoiseConfig> for NlmParams {
    fn from(config: &DenoiseConfig) -> Self {
        Self {
            patch_size: config.patch_size,
            search_radius: config.search_radius,
            strength: config.strength,
        }
    }
}

/// Mirror index into `0..n` without repeating the edge sample.
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let mut m = i.rem_euclid(period);
    if m >= n as isize {
        m = period - m;
    }
    m as usize
}

/// Denoise `image`, returning an image of identical shape and scale.
pub fn denoise(
    image: &ScannedImage,
    params: &NlmParams,
    mode: ExecutionMode,
) -> DoseResult<ScannedImage> {
    if params.patch_size == 0 || !(params.strength.is_finite() && params.strength > 0.0) {
        return Err(DoseError::config(format!(
            "invalid denoise parameters: patch {} strength {}",
            params.patch_size, params.strength
        )));
    }
    if image.is_empty() {
        return Ok(image.clone());
    }

    let w = image.width as usize;
    let h = image.height as usize;
    let full_scale = image.full_scale as f64;
    let norm: Vec<f64> = image.data.iter().map(|&v| v as f64 / full_scale).collect();

    let r = (params.patch_size / 2) as isize;
    let d = params.search_radius as isize;
    let side = (2 * r + 1) as f64;
    let inv_h2 = 1.0 / (params.strength * params.strength);
    let inv_area = 1.0 / (side * side * 3.0);

    let sample =
        |x: isize, y: isize, c: usize| -> f64 { norm[(reflect(y, h) * w + reflect(x, w)) * 3 + c] };

    let mut out = vec![0u16; image.data.len()];
    parallel::for_each_chunk_mut(&mut out, w * 3, mode, |y, row_out| {
        let y = y as isize;
        let ext = w + 2 * r as usize;
        let mut acc = vec![0.0f64; w * 3];
        let mut weight_sum = vec![0.0f64; w];
        let mut col_sums = vec![0.0f64; ext];

        for dy in -d..=d {
            for dx in -d..=d {
                // Column sums of the squared patch difference for x' in [-r, w - 1 + r].
                for (k, col) in col_sums.iter_mut().enumerate() {
                    let xp = k as isize - r;
                    let mut s = 0.0;
                    for py in -r..=r {
                        for c in 0..3 {
                            let diff = sample(xp, y + py, c) - sample(xp + dx, y + py + dy, c);
                            s += diff * diff;
                        }
                    }
                    *col = s;
                }

                let mut window: f64 = col_sums[..(2 * r as usize + 1)].iter().sum();
                for x in 0..w {
                    if x > 0 {
                        window += col_sums[x + 2 * r as usize] - col_sums[x - 1];
                    }
                    let dist2 = (window * inv_area).max(0.0);
                    let weight = (-dist2 * inv_h2).exp();
                    weight_sum[x] += weight;
                    let xi = x as isize;
                    for c in 0..3 {
                        acc[x * 3 + c] += weight * sample(xi + dx, y + dy, c);
                    }
                }
            }
        }

        for x in 0..w {
            for c in 0..3 {
                let v = acc[x * 3 + c] / weight_sum[x];
                row_out[x * 3 + c] = (v * full_scale).round().clamp(0.0, full_scale) as u16;
            }
        }
    });

    verbose_println!(
        "[DENOISE] {}x{} patch {} radius {} h {:.4}",
        image.width,
        image.height,
        2 * r + 1,
        d,
        params.strength
    );

    Ok(ScannedImage {
        width: image.width,
        height: image.height,
        data: out,
        full_scale: image.full_scale,
        pixel_pitch_mm: image.pixel_pitch_mm,
    })
}
