use std::time::Instant;

use filmdose_core::background::BaseDensities;
use filmdose_core::calibration::{Calibration, ValidationReport, VALIDATION_TOLERANCE};
use filmdose_core::DosePipeline;
use serde::Serialize;

use super::ScanInputs;

#[derive(Debug, Clone, Default)]
pub struct CalibrateOptions {
    pub inputs: ScanInputs,
    pub json: bool,
}

/// Calibration products for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationSummary {
    pub pixel_pitch_mm: f64,
    pub base_densities: BaseDensities,
    pub calibration: Calibration,
    pub validation: ValidationReport,
}

/// Fit the sensitometric model on the calibration strip and validate it.
///
/// Stops after calibration: no lateral correction or film inversion runs.
pub fn cmd_calibrate(options: CalibrateOptions) -> Result<(), String> {
    let start_time = Instant::now();
    let (scan, regions) = options.inputs.load()?;
    let config = options.inputs.config()?;

    let mut pipeline = DosePipeline::from_config(config).map_err(|e| e.to_string())?;
    pipeline
        .extract(&scan, &regions)
        .map_err(|e| e.to_string())?;
    let base_densities = pipeline.estimate_background().map_err(|e| e.to_string())?;
    pipeline.denoise().map_err(|e| e.to_string())?;
    let calibration = pipeline.calibrate().map_err(|e| e.to_string())?.clone();
    let validation = pipeline.validate().map_err(|e| e.to_string())?;
    let pixel_pitch_mm = pipeline
        .pixel_pitch_mm()
        .ok_or_else(|| "pixel pitch was not resolved".to_string())?;

    let summary = CalibrationSummary {
        pixel_pitch_mm,
        base_densities,
        calibration,
        validation,
    };

    if options.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Failed to serialize calibration: {}", e))?;
        println!("{}", json);
    } else {
        print_summary(&summary);
        println!();
        println!("Completed in {:.2}s", start_time.elapsed().as_secs_f64());
    }
    Ok(())
}

pub(crate) fn print_summary(summary: &CalibrationSummary) {
    println!(
        "Calibration: {} samples, pixel pitch {:.4} mm",
        summary.calibration.samples.len(),
        summary.pixel_pitch_mm
    );
    for fit in &summary.calibration.fits {
        let c = fit.channel.index();
        println!(
            "  {:<5}  base {:.4}  phi_r {:.5} ± {:.1e}  phi_b {:.5} ± {:.1e}  rmse {:.1e}",
            fit.channel.name(),
            summary.base_densities[c],
            fit.model.phi_r,
            fit.std_err_phi_r,
            fit.model.phi_b,
            fit.std_err_phi_b,
            fit.rmse
        );
    }

    let validation = &summary.validation;
    let within = validation
        .points
        .iter()
        .filter(|p| p.within_tolerance)
        .count();
    println!(
        "Validation: {}/{} points within ±{:.0}%, mean residual {:+.4} Gy, RMS {:.4} Gy, worst {:.1}%",
        within,
        validation.points.len(),
        VALIDATION_TOLERANCE * 100.0,
        validation.mean_residual,
        validation.rms_residual,
        validation.max_abs_relative * 100.0
    );
}
