//! Sensitometric calibration
//!
//! Fits the per-channel two-phase model to the calibration strip against a
//! reference depth-dose table, then derives the rational approximation used
//! to seed per-pixel inversion.

mod fit;
mod profile;
mod rational;
mod reference;
mod validation;

#[cfg(test)]
mod tests;

pub use fit::{fit_amplitudes, ChannelFit, FitSettings};
pub use profile::{density_profile, DensityProfile};
pub use rational::{fit_rational, seed_doses};
pub use reference::ReferenceTable;
pub use validation::{
    validate_calibration, ValidationPoint, ValidationReport, VALIDATION_TOLERANCE,
};

use serde::{Deserialize, Serialize};

use crate::background::BaseDensities;
use crate::config::CalibrationConfig;
use crate::error::DoseResult;
use crate::models::{
    CalibrationTable, Channel, ModelPriors, RationalTable, ScannedImage, TwoPhaseModel,
};
use crate::verbose_println;

/// One retained `(reference dose, measured densities)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Depth in the reference table, cm.
    pub depth_cm: f64,
    /// Position along the strip where it was sampled, cm.
    pub strip_position_cm: f64,
    pub reference_dose: f64,
    pub densities: [f64; 3],
}

/// Everything the calibration stage produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub table: CalibrationTable,
    pub rational: RationalTable,
    pub fits: Vec<ChannelFit>,
    /// Samples inside the depth window, for diagnostics.
    pub samples: Vec<CalibrationSample>,
    pub seed_doses: Vec<f64>,
    pub pixel_pitch_mm: f64,
}

/// Resample the strip profile at the reference depths.
///
/// Depths outside the open window `(depth_min_cm, depth_max_cm)` are
/// skipped, and so is any depth whose shifted position falls outside the
/// profile or lands on an undefined density.
pub fn sample_calibration(
    profile: &DensityProfile,
    reference: &ReferenceTable,
    config: &CalibrationConfig,
) -> DoseResult<Vec<CalibrationSample>> {
    let curves = profile.interpolants()?;
    let mut samples = Vec::new();

    for (depth, dose) in reference.iter() {
        if !(config.depth_min_cm < depth && depth < config.depth_max_cm) {
            continue;
        }
        let position = depth + config.axial_shift_cm;
        let densities = [
            curves[0].eval(position),
            curves[1].eval(position),
            curves[2].eval(position),
        ];
        if let [Some(r), Some(g), Some(b)] = densities {
            samples.push(CalibrationSample {
                depth_cm: depth,
                strip_position_cm: position,
                reference_dose: dose,
                densities: [r, g, b],
            });
        }
    }
    Ok(samples)
}

/// Run the full calibration on a (denoised) strip image.
pub fn calibrate(
    strip: &ScannedImage,
    reference: &ReferenceTable,
    base: &BaseDensities,
    priors: &ModelPriors,
    config: &CalibrationConfig,
    pixel_pitch_mm: f64,
) -> DoseResult<Calibration> {
    let profile = density_profile(strip, config.profile_width, pixel_pitch_mm)?;
    let samples = sample_calibration(&profile, reference, config)?;
    verbose_println!(
        "[CALIBRATION] {} of {} reference points inside ({}, {}) cm, shift {} cm",
        samples.len(),
        reference.len(),
        config.depth_min_cm,
        config.depth_max_cm,
        config.axial_shift_cm
    );

    let doses: Vec<f64> = samples.iter().map(|s| s.reference_dose).collect();
    let settings = FitSettings {
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
    };

    let seeds = match &config.seed_doses {
        Some(seeds) => seeds.clone(),
        None => {
            let max_dose = doses.iter().cloned().fold(0.0, f64::max);
            seed_doses(max_dose * config.seed_headroom, config.seed_count)
        }
    };

    let mut fits = Vec::with_capacity(3);
    let mut models = Vec::with_capacity(3);
    let mut inverses = Vec::with_capacity(3);
    for channel in Channel::ALL {
        let densities: Vec<f64> = samples
            .iter()
            .map(|s| s.densities[channel.index()])
            .collect();
        let start = TwoPhaseModel::from_priors(base[channel.index()], priors.channel(channel));
        let fit = fit_amplitudes(channel, &start, &doses, &densities, &settings)?;
        let inverse = fit_rational(channel, &fit.model, &seeds)?;

        verbose_println!(
            "[CALIBRATION] {}: phi_r {:.5} (±{:.2e}) phi_b {:.5} (±{:.2e}) rmse {:.2e} in {} iterations",
            channel,
            fit.model.phi_r,
            fit.std_err_phi_r,
            fit.model.phi_b,
            fit.std_err_phi_b,
            fit.rmse,
            fit.iterations
        );

        models.push(fit.model);
        inverses.push(inverse);
        fits.push(fit);
    }

    let table = CalibrationTable::new(models[0], models[1], models[2]);
    let rational = RationalTable {
        channels: [inverses[0], inverses[1], inverses[2]],
    };

    Ok(Calibration {
        table,
        rational,
        fits,
        samples,
        seed_doses: seeds,
        pixel_pitch_mm,
    })
}
