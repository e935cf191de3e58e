//! Configuration sections, their default values and validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::combine::CombineMode;
use crate::error::{DoseError, DoseResult};

/// Background patch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Pixels trimmed from every edge of the background patch.
    pub margin: u32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self { margin: 10 }
    }
}

/// Patch-based joint-channel denoising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    pub enabled: bool,
    /// Patch side length in pixels.
    pub patch_size: u32,
    /// Maximum offset searched for similar patches.
    pub search_radius: u32,
    /// Filter strength `h`, in units of normalized intensity (0-1).
    pub strength: f64,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patch_size: 5,
            search_radius: 6,
            strength: 0.01,
        }
    }
}

/// Calibration strip sampling and fit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// CSV file with `position_cm,dose_gy` rows.
    pub reference_table: Option<PathBuf>,
    /// Lower edge of the valid depth window (exclusive), cm.
    pub depth_min_cm: f64,
    /// Upper edge of the valid depth window (exclusive), cm.
    pub depth_max_cm: f64,
    /// Shift added to reference positions to land on scan positions, cm.
    pub axial_shift_cm: f64,
    /// Width of the line profile averaged across the strip, pixels.
    pub profile_width: u32,
    /// Number of synthetic seeds for the rational inverse.
    pub seed_count: usize,
    /// Seeds span `[0, headroom * max reference dose]`.
    pub seed_headroom: f64,
    /// Explicit seed doses; overrides `seed_count`/`seed_headroom` when set.
    pub seed_doses: Option<Vec<f64>>,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            reference_table: None,
            depth_min_cm: 0.5,
            depth_max_cm: 14.0,
            axial_shift_cm: 0.0,
            profile_width: 20,
            seed_count: 8,
            seed_headroom: 1.2,
            seed_doses: None,
            max_iterations: 100,
            tolerance: 1e-12,
        }
    }
}

/// Off-axis correction curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LateralConfig {
    pub enabled: bool,
    /// YAML file with per-channel correction curves.
    pub curve_file: Option<PathBuf>,
}

impl Default for LateralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            curve_file: None,
        }
    }
}

/// Per-pixel root-finding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the dose step (Gy).
    pub tolerance: f64,
    /// Failure fraction above which a warning is reported.
    pub warn_failure_fraction: f64,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 60,
            tolerance: 1e-9,
            warn_failure_fraction: 0.01,
        }
    }
}

/// Channel combination and physical clamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Weights for red, green and blue.
    pub weights: [f64; 3],
    /// Maximum plausible dose (Gy). Required.
    pub dmax: Option<f64>,
    pub mode: CombineMode,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            weights: [0.5, 0.35, 0.15],
            dmax: None,
            mode: CombineMode::Weighted,
        }
    }
}

/// Scanner properties not always present in the image metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Pixel pitch (mm) used when the scan carries no resolution tag.
    pub pixel_pitch_mm: Option<f64>,
}

fn require_positive(name: &str, value: f64) -> DoseResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DoseError::config(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

impl DenoiseConfig {
    pub(crate) fn validate(&self) -> DoseResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.patch_size == 0 {
            return Err(DoseError::config("denoise.patch_size must be at least 1"));
        }
        require_positive("denoise.strength", self.strength)
    }
}

impl CalibrationConfig {
    pub(crate) fn validate(&self) -> DoseResult<()> {
        if !(self.depth_min_cm.is_finite() && self.depth_max_cm.is_finite()) {
            return Err(DoseError::config("calibration depth window must be finite"));
        }
        if self.depth_min_cm >= self.depth_max_cm {
            return Err(DoseError::config(format!(
                "calibration.depth_min_cm ({}) must be below depth_max_cm ({})",
                self.depth_min_cm, self.depth_max_cm
            )));
        }
        if !self.axial_shift_cm.is_finite() {
            return Err(DoseError::config("calibration.axial_shift_cm must be finite"));
        }
        if self.profile_width == 0 {
            return Err(DoseError::config("calibration.profile_width must be at least 1"));
        }
        match &self.seed_doses {
            Some(seeds) => {
                if seeds.len() < 3 {
                    return Err(DoseError::config(
                        "calibration.seed_doses needs at least 3 doses",
                    ));
                }
                if seeds.iter().any(|d| !d.is_finite() || *d < 0.0) {
                    return Err(DoseError::config(
                        "calibration.seed_doses must be finite and non-negative",
                    ));
                }
            }
            None => {
                if self.seed_count < 3 {
                    return Err(DoseError::config("calibration.seed_count must be at least 3"));
                }
                require_positive("calibration.seed_headroom", self.seed_headroom)?;
            }
        }
        if self.max_iterations == 0 {
            return Err(DoseError::config("calibration.max_iterations must be positive"));
        }
        require_positive("calibration.tolerance", self.tolerance)
    }
}

impl InversionConfig {
    pub(crate) fn validate(&self) -> DoseResult<()> {
        if self.max_iterations == 0 {
            return Err(DoseError::config("inversion.max_iterations must be positive"));
        }
        require_positive("inversion.tolerance", self.tolerance)?;
        if !(0.0..=1.0).contains(&self.warn_failure_fraction) {
            return Err(DoseError::config(
                "inversion.warn_failure_fraction must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

impl CombineConfig {
    pub(crate) fn validate(&self) -> DoseResult<()> {
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DoseError::config(
                "combine.weights must be finite and non-negative",
            ));
        }
        if self.weights.iter().sum::<f64>() <= 0.0 {
            return Err(DoseError::config("combine.weights must not all be zero"));
        }
        match self.dmax {
            Some(dmax) => require_positive("combine.dmax", dmax),
            None => Err(DoseError::config(
                "combine.dmax (maximum plausible dose) is not set",
            )),
        }
    }

    /// Validated maximum dose.
    pub fn dmax(&self) -> DoseResult<f64> {
        self.validate()?;
        self.dmax
            .ok_or_else(|| DoseError::config("combine.dmax is not set"))
    }
}

impl ScannerConfig {
    pub(crate) fn validate(&self) -> DoseResult<()> {
        match self.pixel_pitch_mm {
            Some(pitch) => require_positive("scanner.pixel_pitch_mm", pitch),
            None => Ok(()),
        }
    }
}
