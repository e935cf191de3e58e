//! Channel combination and dose clamping
//!
//! Per-channel doses are merged into one value per pixel and clamped to
//! `[0, dmax]`. Non-finite channel doses (failed inversions) are replaced by
//! [`NON_FINITE_SENTINEL`] before weighting, so a failed pixel ends up at
//! `dmax` after the clamp rather than spreading NaN into later statistics.

use serde::{Deserialize, Serialize};

use crate::error::{DoseError, DoseResult};
use crate::models::{Channel, ChannelDoseImage, DoseImage};
use crate::parallel::{self, ExecutionMode};
use crate::verbose_println;

/// Stand-in for a non-finite channel dose, Gy.
pub const NON_FINITE_SENTINEL: f64 = 1.0e6;

/// Which channel estimates make up the final dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Weighted mean of all three channels.
    #[default]
    Weighted,
    Red,
    Green,
    Blue,
}

impl CombineMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "weighted" => Some(CombineMode::Weighted),
            "red" | "r" => Some(CombineMode::Red),
            "green" | "g" => Some(CombineMode::Green),
            "blue" | "b" => Some(CombineMode::Blue),
            _ => None,
        }
    }

    fn single_channel(self) -> Option<Channel> {
        match self {
            CombineMode::Weighted => None,
            CombineMode::Red => Some(Channel::Red),
            CombineMode::Green => Some(Channel::Green),
            CombineMode::Blue => Some(Channel::Blue),
        }
    }
}

#[inline]
fn guard(dose: f64) -> f64 {
    if dose.is_finite() {
        dose
    } else {
        NON_FINITE_SENTINEL
    }
}

/// Combined, clamped dose for one pixel.
#[inline]
pub fn combine_pixel(doses: [f64; 3], weights: [f64; 3], mode: CombineMode, dmax: f64) -> f64 {
    let value = match mode.single_channel() {
        Some(channel) => guard(doses[channel.index()]),
        None => {
            let total = weights[0] + weights[1] + weights[2];
            (weights[0] * guard(doses[0])
                + weights[1] * guard(doses[1])
                + weights[2] * guard(doses[2]))
                / total
        }
    };
    if value.is_nan() {
        dmax
    } else {
        value.clamp(0.0, dmax)
    }
}

fn check_inputs(weights: [f64; 3], dmax: f64) -> DoseResult<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(DoseError::config(format!(
            "channel weights must be finite and non-negative, got {:?}",
            weights
        )));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(DoseError::config("channel weights sum to zero"));
    }
    if !(dmax.is_finite() && dmax > 0.0) {
        return Err(DoseError::config(format!(
            "dmax must be a positive dose, got {}",
            dmax
        )));
    }
    Ok(())
}

/// Merge a per-channel dose image into the final [`DoseImage`].
pub fn combine_channels(
    doses: &ChannelDoseImage,
    weights: [f64; 3],
    mode: CombineMode,
    dmax: f64,
) -> DoseResult<DoseImage> {
    check_inputs(weights, dmax)?;
    let width = doses.width as usize;
    let pixels = width * doses.height as usize;
    if doses.data.len() != pixels * 3 {
        return Err(DoseError::InvalidShape(format!(
            "channel dose image holds {} samples, expected {}",
            doses.data.len(),
            pixels * 3
        )));
    }

    let mut out = vec![0.0f64; pixels];
    parallel::for_each_chunk_mut(&mut out, width, ExecutionMode::Auto, |y, row| {
        for (x, value) in row.iter_mut().enumerate() {
            let idx = (y * width + x) * 3;
            let px = [doses.data[idx], doses.data[idx + 1], doses.data[idx + 2]];
            *value = combine_pixel(px, weights, mode, dmax);
        }
    });

    let clamped_high = out.iter().filter(|&&v| v == dmax).count();
    verbose_println!(
        "[COMBINE] {:?} mode, weights {:?}, {} of {} pixels at dmax {} Gy",
        mode,
        weights,
        clamped_high,
        pixels,
        dmax
    );

    Ok(DoseImage::new(doses.width, doses.height, out))
}
