//! Scalar root-finding for `density = model(dose)`.
//!
//! The two-phase response is strictly increasing and concave, so Newton's
//! method started from either side of the root converges monotonically once
//! it is left of it. A bracket is kept anyway: steps that leave it, or that
//! fail to halve once both sides are known, fall back to bisection (or to
//! expansion while one side is still open).

use crate::config::InversionConfig;
use crate::models::TwoPhaseModel;

/// Iteration limits for [`invert_density`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Convergence threshold on the dose step, relative to `1 + |dose|`.
    pub tolerance: f64,
}

impl From<&InversionConfig> for SolverSettings {
    fn from(config: &InversionConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self::from(&InversionConfig::default())
    }
}

/// Dose whose predicted density equals `density`, starting from `seed`.
///
/// Returns `None` when the density is non-finite, at or beyond the model's
/// saturation density, or when the iteration does not settle.
pub fn invert_density(
    model: &TwoPhaseModel,
    density: f64,
    seed: f64,
    settings: &SolverSettings,
) -> Option<f64> {
    if !density.is_finite() || density >= model.saturation_density() {
        return None;
    }

    let mut x = if seed.is_finite() { seed } else { 0.0 };
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    let mut previous_step = f64::INFINITY;

    for _ in 0..settings.max_iterations {
        let g = model.density(x) - density;
        if g == 0.0 {
            return Some(x);
        }
        if g < 0.0 {
            lo = lo.max(x);
        } else {
            hi = hi.min(x);
        }

        let newton = x - g / model.slope(x);
        if newton.is_finite() && (newton - x).abs() <= settings.tolerance * (1.0 + x.abs()) {
            return Some(newton);
        }

        let bracketed = lo.is_finite() && hi.is_finite();
        let accept = newton.is_finite()
            && newton > lo
            && newton < hi
            && !(bracketed && (newton - x).abs() > 0.5 * previous_step);

        let next = if accept {
            newton
        } else {
            match (lo.is_finite(), hi.is_finite()) {
                (true, true) => 0.5 * (lo + hi),
                (true, false) => lo + 2.0 * (lo.abs() + 1.0),
                (false, true) => hi - 2.0 * (hi.abs() + 1.0),
                (false, false) => return None,
            }
        };
        previous_step = (next - x).abs();
        x = next;
    }
    None
}
