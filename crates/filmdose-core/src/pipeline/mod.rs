//! Dose reconstruction pipeline
//!
//! [`DosePipeline`] owns every intermediate product of a run and a stage
//! marker that only moves forward:
//!
//! ```text
//! Idle -> Extracted -> BackgroundKnown -> Denoised -> Calibrated
//!      -> LaterallyCorrected -> Inverted -> Combined
//! ```
//!
//! Each stage method checks that the previous stage has completed and
//! returns [`DoseError::StageOrder`] otherwise. A failing stage leaves the
//! marker where it was, so no partial dose map is ever exposed. Call
//! [`DosePipeline::reset`] (or [`DosePipeline::run`], which resets first)
//! to process another scan.

#[cfg(test)]
mod tests;

use serde::Serialize;

use crate::background::{estimate_background, BaseDensities};
use crate::calibration::{
    calibrate, validate_calibration, Calibration, ReferenceTable, ValidationReport,
};
use crate::combine::combine_channels;
use crate::config::DoseConfig;
use crate::denoise::{denoise, NlmParams};
use crate::error::{DoseError, DoseResult};
use crate::inversion::{invert_film, InversionOutput, InversionStats, SolverSettings};
use crate::lateral::{correct_columns, LateralCorrectionCurves, LateralGeometry};
use crate::models::{
    CalibrationTable, DoseImage, OpticalDensityImage, Region, RegionLabel, ScannedImage,
};
use crate::parallel::ExecutionMode;
use crate::regions::{extract_regions, RegionLayout, SegmentedScan};
use crate::verbose_println;

/// Position of a run in the processing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Stage {
    Idle,
    Extracted,
    BackgroundKnown,
    Denoised,
    Calibrated,
    LaterallyCorrected,
    Inverted,
    Combined,
}

/// Products of a completed run.
#[derive(Debug, Clone)]
pub struct DoseRun {
    pub dose: DoseImage,
    pub calibration: Calibration,
    pub validation: ValidationReport,
    pub inversion_stats: InversionStats,
    pub base: BaseDensities,
    pub layout: RegionLayout,
    pub pixel_pitch_mm: f64,
    pub config_fingerprint: u64,
}

struct DenoisedImages {
    calibration: ScannedImage,
    film: ScannedImage,
}

/// Explicit context for one reconstruction run.
pub struct DosePipeline {
    config: DoseConfig,
    reference: ReferenceTable,
    curves: LateralCorrectionCurves,
    mode: ExecutionMode,
    stage: Stage,

    segmented: Option<SegmentedScan>,
    pixel_pitch_mm: Option<f64>,
    base: Option<BaseDensities>,
    denoised: Option<DenoisedImages>,
    calibration: Option<Calibration>,
    columns: Option<Vec<CalibrationTable>>,
    inversion: Option<InversionOutput>,
    dose: Option<DoseImage>,
}

impl DosePipeline {
    /// Build a pipeline from an already loaded reference table and curve set.
    ///
    /// The configuration is validated up front. When lateral correction is
    /// disabled the curves are replaced by the identity.
    pub fn new(
        config: DoseConfig,
        reference: ReferenceTable,
        curves: LateralCorrectionCurves,
    ) -> DoseResult<Self> {
        config.validate()?;
        let curves = if config.lateral.enabled {
            curves
        } else {
            LateralCorrectionCurves::identity()
        };
        Ok(Self {
            config,
            reference,
            curves,
            mode: ExecutionMode::Auto,
            stage: Stage::Idle,
            segmented: None,
            pixel_pitch_mm: None,
            base: None,
            denoised: None,
            calibration: None,
            columns: None,
            inversion: None,
            dose: None,
        })
    }

    /// Load the reference table and correction curves named in `config`.
    pub fn from_config(config: DoseConfig) -> DoseResult<Self> {
        config.validate()?;
        let reference_path = config
            .calibration
            .reference_table
            .as_ref()
            .ok_or_else(|| DoseError::config("calibration.reference_table is not set"))?;
        let reference = ReferenceTable::load(reference_path)?;

        let curves = match (&config.lateral.curve_file, config.lateral.enabled) {
            (Some(path), true) => LateralCorrectionCurves::load(path)?,
            _ => LateralCorrectionCurves::identity(),
        };
        Self::new(config, reference, curves)
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(&self) -> &DoseConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Drop all intermediate products and return to [`Stage::Idle`].
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.segmented = None;
        self.pixel_pitch_mm = None;
        self.base = None;
        self.denoised = None;
        self.calibration = None;
        self.columns = None;
        self.inversion = None;
        self.dose = None;
    }

    fn require(&self, expected: Stage) -> DoseResult<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(self.out_of_order(expected))
        }
    }

    fn out_of_order(&self, expected: Stage) -> DoseError {
        DoseError::StageOrder {
            expected,
            found: self.stage,
        }
    }

    fn resolve_pixel_pitch(&self, scan_pitch: Option<f64>) -> DoseResult<f64> {
        let pitch = scan_pitch
            .or(self.config.scanner.pixel_pitch_mm)
            .ok_or_else(|| {
                DoseError::config(
                    "scan carries no resolution and scanner.pixel_pitch_mm is not set",
                )
            })?;
        if pitch.is_finite() && pitch > 0.0 {
            Ok(pitch)
        } else {
            Err(DoseError::config(format!(
                "pixel pitch must be positive, got {}",
                pitch
            )))
        }
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    /// Crop the four labeled regions out of `scan`.
    pub fn extract(
        &mut self,
        scan: &ScannedImage,
        regions: &[Region],
    ) -> DoseResult<&SegmentedScan> {
        self.require(Stage::Idle)?;
        let segmented = extract_regions(scan, regions)?;
        let pitch = self.resolve_pixel_pitch(segmented.pixel_pitch_mm)?;
        self.pixel_pitch_mm = Some(pitch);
        self.stage = Stage::Extracted;
        Ok(&*self.segmented.insert(segmented))
    }

    pub fn estimate_background(&mut self) -> DoseResult<BaseDensities> {
        self.require(Stage::Extracted)?;
        let segmented = self
            .segmented
            .as_ref()
            .ok_or_else(|| self.out_of_order(Stage::Extracted))?;
        let base = estimate_background(&segmented.background, self.config.background.margin)?;
        self.base = Some(base);
        self.stage = Stage::BackgroundKnown;
        Ok(base)
    }

    /// Denoise the calibration strip and the film.
    pub fn denoise(&mut self) -> DoseResult<()> {
        self.require(Stage::BackgroundKnown)?;
        let segmented = self
            .segmented
            .as_ref()
            .ok_or_else(|| self.out_of_order(Stage::Extracted))?;

        for label in [RegionLabel::Calibration, RegionLabel::Film] {
            if segmented.image(label).is_empty() {
                return Err(DoseError::EmptyRegion { label });
            }
        }

        let images = if self.config.denoise.enabled {
            let params = NlmParams::from(&self.config.denoise);
            DenoisedImages {
                calibration: denoise(&segmented.calibration, &params, self.mode)?,
                film: denoise(&segmented.film, &params, self.mode)?,
            }
        } else {
            verbose_println!("[DENOISE] disabled");
            DenoisedImages {
                calibration: segmented.calibration.clone(),
                film: segmented.film.clone(),
            }
        };
        self.denoised = Some(images);
        self.stage = Stage::Denoised;
        Ok(())
    }

    /// Fit the per-channel models on the denoised strip.
    pub fn calibrate(&mut self) -> DoseResult<&Calibration> {
        self.require(Stage::Denoised)?;
        let denoised = self
            .denoised
            .as_ref()
            .ok_or_else(|| self.out_of_order(Stage::Denoised))?;
        let base = self
            .base
            .ok_or_else(|| self.out_of_order(Stage::BackgroundKnown))?;
        let pitch = self
            .pixel_pitch_mm
            .ok_or_else(|| self.out_of_order(Stage::Extracted))?;

        let calibration = calibrate(
            &denoised.calibration,
            &self.reference,
            &base,
            &self.config.model,
            &self.config.calibration,
            pitch,
        )?;
        self.stage = Stage::Calibrated;
        Ok(&*self.calibration.insert(calibration))
    }

    /// Per-column calibration tables for the film.
    pub fn correct_lateral(&mut self) -> DoseResult<&[CalibrationTable]> {
        self.require(Stage::Calibrated)?;
        let (segmented, calibration, pitch) =
            match (&self.segmented, &self.calibration, self.pixel_pitch_mm) {
                (Some(s), Some(c), Some(p)) => (s, c, p),
                _ => return Err(self.out_of_order(Stage::Calibrated)),
            };

        let geometry = LateralGeometry::from_layout(&segmented.layout, pitch);
        let columns = correct_columns(
            &calibration.table,
            &self.curves,
            &geometry,
            segmented.film.width,
        )?;
        self.stage = Stage::LaterallyCorrected;
        Ok(self.columns.insert(columns).as_slice())
    }

    /// Invert every film pixel. Pixel failures are counted, not fatal.
    pub fn invert(&mut self) -> DoseResult<InversionStats> {
        self.require(Stage::LaterallyCorrected)?;
        let (denoised, calibration, columns) =
            match (&self.denoised, &self.calibration, &self.columns) {
                (Some(d), Some(c), Some(cols)) => (d, c, cols),
                _ => return Err(self.out_of_order(Stage::LaterallyCorrected)),
            };

        let density = OpticalDensityImage::from_scan(&denoised.film);
        let settings = SolverSettings::from(&self.config.inversion);
        let output = invert_film(
            &density,
            columns,
            &calibration.rational,
            &settings,
            self.mode,
        )?;

        let stats = output.stats;
        let worst = stats.worst_failure_fraction();
        if worst > self.config.inversion.warn_failure_fraction {
            verbose_println!(
                "[INVERSION] warning: {:.2}% of pixels failed to invert in at least one channel; check calibration and denoising",
                worst * 100.0
            );
        }
        self.inversion = Some(output);
        self.stage = Stage::Inverted;
        Ok(stats)
    }

    /// Merge channels and clamp into the final dose map.
    pub fn combine(&mut self) -> DoseResult<&DoseImage> {
        self.require(Stage::Inverted)?;
        let inversion = self
            .inversion
            .as_ref()
            .ok_or_else(|| self.out_of_order(Stage::Inverted))?;
        let combine = &self.config.combine;
        let dose = combine_channels(
            &inversion.doses,
            combine.weights,
            combine.mode,
            combine.dmax()?,
        )?;
        self.stage = Stage::Combined;
        Ok(&*self.dose.insert(dose))
    }

    /// Residuals of the current calibration against its reference points.
    pub fn validate(&self) -> DoseResult<ValidationReport> {
        let calibration = self
            .calibration
            .as_ref()
            .ok_or_else(|| self.out_of_order(Stage::Calibrated))?;
        let combine = &self.config.combine;
        Ok(validate_calibration(
            calibration,
            combine.weights,
            combine.mode,
            combine.dmax()?,
            &SolverSettings::from(&self.config.inversion),
        ))
    }

    /// Run every stage on `scan` from a clean state.
    pub fn run(&mut self, scan: &ScannedImage, regions: &[Region]) -> DoseResult<DoseRun> {
        self.reset();
        self.extract(scan, regions)?;
        let base = self.estimate_background()?;
        self.denoise()?;
        let calibration = self.calibrate()?.clone();
        let validation = self.validate()?;
        self.correct_lateral()?;
        let inversion_stats = self.invert()?;
        let dose = self.combine()?.clone();

        let (layout, pixel_pitch_mm) = match (&self.segmented, self.pixel_pitch_mm) {
            (Some(s), Some(p)) => (s.layout, p),
            _ => return Err(self.out_of_order(Stage::Extracted)),
        };

        Ok(DoseRun {
            dose,
            calibration,
            validation,
            inversion_stats,
            base,
            layout,
            pixel_pitch_mm,
            config_fingerprint: self.config.fingerprint(),
        })
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub fn segmented(&self) -> Option<&SegmentedScan> {
        self.segmented.as_ref()
    }

    pub fn base(&self) -> Option<BaseDensities> {
        self.base
    }

    pub fn pixel_pitch_mm(&self) -> Option<f64> {
        self.pixel_pitch_mm
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn column_tables(&self) -> Option<&[CalibrationTable]> {
        self.columns.as_deref()
    }

    pub fn inversion_stats(&self) -> Option<InversionStats> {
        self.inversion.as_ref().map(|o| o.stats)
    }

    pub fn dose(&self) -> Option<&DoseImage> {
        self.dose.as_ref()
    }
}
