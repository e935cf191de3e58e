//! Self-consistency check of a calibration against its own reference points.
//!
//! Each retained sample's measured densities are pushed back through the
//! fitted model and combined with [`combine_pixel`] under the run's mode,
//! weights and `dmax`, then compared with the reference dose at that depth.

use serde::{Deserialize, Serialize};

use super::Calibration;
use crate::combine::{combine_pixel, CombineMode};
use crate::inversion::{invert_density, SolverSettings};
use crate::models::Channel;

/// Relative residual (10%) beyond which a point is flagged.
pub const VALIDATION_TOLERANCE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationPoint {
    pub depth_cm: f64,
    pub reference_dose: f64,
    /// Per-channel reconstructed dose; NaN where inversion failed.
    pub channel_doses: [f64; 3],
    pub reconstructed_dose: f64,
    /// `reconstructed - reference`, Gy.
    pub residual: f64,
    /// Residual divided by the reference dose.
    pub relative_residual: f64,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub points: Vec<ValidationPoint>,
    pub mean_residual: f64,
    pub rms_residual: f64,
    pub max_abs_relative: f64,
    /// Share of points within [`VALIDATION_TOLERANCE`].
    pub fraction_within: f64,
}

/// Reconstruct every calibration sample and report residuals.
///
/// A sample whose inversion fails in a contributing channel reconstructs to
/// `dmax`, as a film pixel would. Points with a zero reference dose have no
/// relative residual (NaN) and are never counted as within tolerance.
/// Summary statistics skip non-finite residuals.
pub fn validate_calibration(
    calibration: &Calibration,
    weights: [f64; 3],
    mode: CombineMode,
    dmax: f64,
    settings: &SolverSettings,
) -> ValidationReport {
    let points: Vec<ValidationPoint> = calibration
        .samples
        .iter()
        .map(|sample| {
            let mut channel_doses = [f64::NAN; 3];
            for channel in Channel::ALL {
                let c = channel.index();
                let density = sample.densities[c];
                let seed = calibration.rational[channel].dose(density);
                if let Some(dose) =
                    invert_density(&calibration.table[channel], density, seed, settings)
                {
                    channel_doses[c] = dose;
                }
            }
            let reconstructed_dose = combine_pixel(channel_doses, weights, mode, dmax);
            let residual = reconstructed_dose - sample.reference_dose;
            let relative_residual = if sample.reference_dose != 0.0 {
                residual / sample.reference_dose
            } else {
                f64::NAN
            };
            ValidationPoint {
                depth_cm: sample.depth_cm,
                reference_dose: sample.reference_dose,
                channel_doses,
                reconstructed_dose,
                residual,
                relative_residual,
                within_tolerance: relative_residual.abs() <= VALIDATION_TOLERANCE,
            }
        })
        .collect();

    let residuals: Vec<f64> = points
        .iter()
        .map(|p| p.residual)
        .filter(|r| r.is_finite())
        .collect();
    let n = residuals.len() as f64;
    let (mean_residual, rms_residual) = if residuals.is_empty() {
        (f64::NAN, f64::NAN)
    } else {
        (
            residuals.iter().sum::<f64>() / n,
            (residuals.iter().map(|r| r * r).sum::<f64>() / n).sqrt(),
        )
    };
    let max_abs_relative = points
        .iter()
        .map(|p| p.relative_residual.abs())
        .filter(|r| r.is_finite())
        .fold(0.0, f64::max);
    let fraction_within = if points.is_empty() {
        0.0
    } else {
        points.iter().filter(|p| p.within_tolerance).count() as f64 / points.len() as f64
    };

    ValidationReport {
        points,
        mean_residual,
        rms_residual,
        max_abs_relative,
        fraction_within,
    }
}
