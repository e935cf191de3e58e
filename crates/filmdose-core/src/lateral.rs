//! Off-axis (lateral) response correction
//!
//! A flatbed scanner reads a film differently depending on its distance from
//! the lamp's optical axis. For a film column `j` the lateral offset is
//! `x(j) = |o - (p0 + j)| * pitch`, where `o` is the axis column (center of
//! the `Center` region), `p0` the film's left edge and `pitch` the pixel
//! pitch. Amplitudes are rescaled relative to the calibration strip's own
//! offset `x(c)`:
//!
//! ```text
//! phi_r'(j) = phi_r * curve_r(x(j)) / curve_r(x(c))
//! ```
//!
//! and likewise for `phi_b`. Rates and base density are untouched, and the
//! correction is constant down each column.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DoseError, DoseResult};
use crate::interp::LinearInterpolant;
use crate::models::{CalibrationTable, Channel};
use crate::regions::RegionLayout;
use crate::verbose_println;

/// Length unit of curve positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveUnit {
    #[default]
    Mm,
    Cm,
}

impl CurveUnit {
    fn from_mm(self, mm: f64) -> f64 {
        match self {
            CurveUnit::Mm => mm,
            CurveUnit::Cm => mm / 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledCurve {
    pub positions: Vec<f64>,
    pub phi_r: Vec<f64>,
    pub phi_b: Vec<f64>,
}

/// On-disk layout of a correction curve file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFile {
    #[serde(default)]
    pub unit: CurveUnit,
    pub red: SampledCurve,
    pub green: SampledCurve,
    pub blue: SampledCurve,
}

#[derive(Debug, Clone, PartialEq)]
struct ChannelCurves {
    phi_r: LinearInterpolant,
    phi_b: LinearInterpolant,
}

/// Scale-factor curves for every channel, held constant outside their
/// sampled range.
#[derive(Debug, Clone, PartialEq)]
pub struct LateralCorrectionCurves {
    unit: CurveUnit,
    channels: [ChannelCurves; 3],
}

impl LateralCorrectionCurves {
    /// Curves equal to one everywhere; correction becomes the identity.
    pub fn identity() -> Self {
        let flat = || ChannelCurves {
            phi_r: LinearInterpolant::constant(1.0),
            phi_b: LinearInterpolant::constant(1.0),
        };
        Self {
            unit: CurveUnit::Mm,
            channels: [flat(), flat(), flat()],
        }
    }

    pub fn from_file_contents(file: CurveFile) -> DoseResult<Self> {
        let build = |channel: Channel, curve: SampledCurve| -> DoseResult<ChannelCurves> {
            let wrap = |e: DoseError| {
                DoseError::config(format!("lateral curve for {} channel: {}", channel, e))
            };
            Ok(ChannelCurves {
                phi_r: LinearInterpolant::new(curve.positions.clone(), curve.phi_r)
                    .map_err(wrap)?,
                phi_b: LinearInterpolant::new(curve.positions, curve.phi_b).map_err(wrap)?,
            })
        };
        Ok(Self {
            unit: file.unit,
            channels: [
                build(Channel::Red, file.red)?,
                build(Channel::Green, file.green)?,
                build(Channel::Blue, file.blue)?,
            ],
        })
    }

    pub fn from_yaml(contents: &str) -> DoseResult<Self> {
        let file: CurveFile =
            serde_yaml::from_str(contents).map_err(|e| DoseError::config(e.to_string()))?;
        Self::from_file_contents(file)
    }

    pub fn load(path: &Path) -> DoseResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
            .map_err(|e| DoseError::config(format!("{}: {}", path.display(), e)))
    }

    /// `(phi_r, phi_b)` scale factors at a lateral offset in millimetres.
    pub fn factors(&self, channel: Channel, offset_mm: f64) -> (f64, f64) {
        let x = self.unit.from_mm(offset_mm);
        let curves = &self.channels[channel.index()];
        (curves.phi_r.eval_clamped(x), curves.phi_b.eval_clamped(x))
    }
}

/// Reference positions for the correction, in scan pixel columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateralGeometry {
    /// Scanner axis `o`.
    pub axis_column: f64,
    /// Calibration strip position `c`.
    pub calibration_column: f64,
    /// Film left edge `p0`.
    pub film_left: f64,
    pub pixel_pitch_mm: f64,
}

impl LateralGeometry {
    pub fn from_layout(layout: &RegionLayout, pixel_pitch_mm: f64) -> Self {
        Self {
            axis_column: layout.center.center_column(),
            calibration_column: layout.calibration.center_column(),
            film_left: layout.film.left as f64,
            pixel_pitch_mm,
        }
    }

    /// Lateral offset in millimetres of a scan column.
    #[inline]
    pub fn offset_mm(&self, scan_column: f64) -> f64 {
        (self.axis_column - scan_column).abs() * self.pixel_pitch_mm
    }

    /// Offset of film column `j`.
    pub fn film_offset_mm(&self, j: u32) -> f64 {
        self.offset_mm(self.film_left + j as f64)
    }

    pub fn calibration_offset_mm(&self) -> f64 {
        self.offset_mm(self.calibration_column)
    }
}

/// Calibration table for a column at lateral offset `offset_mm`.
pub fn correct_at(
    table: &CalibrationTable,
    curves: &LateralCorrectionCurves,
    calibration_offset_mm: f64,
    offset_mm: f64,
) -> DoseResult<CalibrationTable> {
    let mut corrected = *table;
    for channel in Channel::ALL {
        let (ref_r, ref_b) = curves.factors(channel, calibration_offset_mm);
        if !(ref_r > 0.0 && ref_b > 0.0) {
            return Err(DoseError::config(format!(
                "lateral curve for {} channel is not positive at the calibration position ({:.3} mm)",
                channel, calibration_offset_mm
            )));
        }
        let (fr, fb) = curves.factors(channel, offset_mm);
        let scale_r = fr / ref_r;
        let scale_b = fb / ref_b;
        if !(scale_r >= 0.0 && scale_b >= 0.0) {
            return Err(DoseError::config(format!(
                "lateral curve for {} channel is negative at {:.3} mm",
                channel, offset_mm
            )));
        }
        let model = &table[channel];
        corrected.channels[channel.index()] =
            model.with_amplitudes(model.phi_r * scale_r, model.phi_b * scale_b);
    }
    Ok(corrected)
}

/// One corrected table per film column, in column order.
pub fn correct_columns(
    table: &CalibrationTable,
    curves: &LateralCorrectionCurves,
    geometry: &LateralGeometry,
    film_width: u32,
) -> DoseResult<Vec<CalibrationTable>> {
    let reference = geometry.calibration_offset_mm();
    let columns = (0..film_width)
        .map(|j| correct_at(table, curves, reference, geometry.film_offset_mm(j)))
        .collect::<DoseResult<Vec<_>>>()?;

    verbose_println!(
        "[LATERAL] axis col {:.1}, calibration offset {:.2} mm, film offsets {:.2}..{:.2} mm",
        geometry.axis_column,
        reference,
        geometry.film_offset_mm(0),
        geometry.film_offset_mm(film_width.saturating_sub(1))
    );
    Ok(columns)
}
