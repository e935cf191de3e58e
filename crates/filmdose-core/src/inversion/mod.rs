//! Per-pixel dose inversion
//!
//! Every film column carries its own laterally corrected calibration table,
//! so columns are independent units of work. They are dispatched to the
//! rayon pool and reassembled in column order. A pixel whose root-find
//! fails becomes NaN and is counted; it never aborts the run.

mod solver;


pub use solver::{invert_density, SolverSettings};

use serde::{Deserialize, Serialize};

use crate::error::{DoseError, DoseResult};
use crate::models::{
    CalibrationTable, Channel, ChannelDoseImage, OpticalDensityImage, RationalTable,
};
use crate::parallel::{self, ExecutionMode};
use crate::verbose_println;

/// Per-channel counts of pixels that could not be inverted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InversionStats {
    pub pixels: usize,
    pub failures: [usize; 3],
}

impl InversionStats {
    pub fn failures(&self, channel: Channel) -> usize {
        self.failures[channel.index()]
    }

    pub fn failure_fraction(&self, channel: Channel) -> f64 {
        if self.pixels == 0 {
            0.0
        } else {
            self.failures(channel) as f64 / self.pixels as f64
        }
    }

    /// Largest per-channel failure fraction.
    pub fn worst_failure_fraction(&self) -> f64 {
        Channel::ALL
            .iter()
            .map(|&c| self.failure_fraction(c))
            .fold(0.0, f64::max)
    }

    pub fn total_failures(&self) -> usize {
        self.failures.iter().sum()
    }
}

/// Dose estimates for every film pixel and channel.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionOutput {
    pub doses: ChannelDoseImage,
    pub stats: InversionStats,
}

struct ColumnResult {
    doses: Vec<[f64; 3]>,
    failures: [usize; 3],
}

fn invert_column(
    density: &OpticalDensityImage,
    x: u32,
    table: &CalibrationTable,
    rational: &RationalTable,
    settings: &SolverSettings,
) -> DoseResult<ColumnResult> {
    let expected = density.width as usize * density.height as usize * 3;
    if density.data.len() != expected {
        return Err(DoseError::InvalidShape(format!(
            "density image holds {} samples, expected {}",
            density.data.len(),
            expected
        )));
    }

    let mut doses = Vec::with_capacity(density.height as usize);
    let mut failures = [0usize; 3];
    for y in 0..density.height {
        let px = density.get(x, y);
        let mut out = [f64::NAN; 3];
        for channel in Channel::ALL {
            let c = channel.index();
            let seed = rational[channel].dose(px[c]);
            match invert_density(&table[channel], px[c], seed, settings) {
                Some(dose) => out[c] = dose,
                None => failures[c] += 1,
            }
        }
        doses.push(out);
    }
    Ok(ColumnResult { doses, failures })
}

/// Invert every pixel of `density` using `columns[x]` for column `x`.
pub fn invert_film(
    density: &OpticalDensityImage,
    columns: &[CalibrationTable],
    rational: &RationalTable,
    settings: &SolverSettings,
    mode: ExecutionMode,
) -> DoseResult<InversionOutput> {
    let width = density.width as usize;
    let height = density.height as usize;
    if columns.len() != width {
        return Err(DoseError::InvalidShape(format!(
            "{} column models for a film {} columns wide",
            columns.len(),
            width
        )));
    }

    let results = parallel::try_map_units(width, mode, |x| {
        invert_column(density, x as u32, &columns[x], rational, settings)
    })?;

    let mut data = vec![f64::NAN; width * height * 3];
    let mut stats = InversionStats {
        pixels: width * height,
        failures: [0; 3],
    };
    for (x, column) in results.into_iter().enumerate() {
        for (y, dose) in column.doses.into_iter().enumerate() {
            let idx = (y * width + x) * 3;
            data[idx..idx + 3].copy_from_slice(&dose);
        }
        for c in 0..3 {
            stats.failures[c] += column.failures[c];
        }
    }

    verbose_println!(
        "[INVERSION] {}x{} film, failures r/g/b = {}/{}/{}",
        width,
        height,
        stats.failures[0],
        stats.failures[1],
        stats.failures[2]
    );

    Ok(InversionOutput {
        doses: ChannelDoseImage {
            width: density.width,
            height: density.height,
            data,
        },
        stats,
    })
}
