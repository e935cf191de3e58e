//! Amplitude fit of the two-phase model.
//!
//! Base density and rate constants are held fixed; `phi_r` and `phi_b` are
//! found by a Levenberg-Marquardt iteration with an active set for the
//! `phi >= 0` bounds. A parameter sitting on its bound whose gradient points
//! outward is frozen for that step, so a converged point satisfies the KKT
//! conditions of the bounded problem.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{DoseError, DoseResult};
use crate::models::{Channel, TwoPhaseModel};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;

/// Fit outcome and diagnostics for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFit {
    pub channel: Channel,
    pub model: TwoPhaseModel,
    /// Standard errors of `phi_r` and `phi_b`; NaN when undetermined.
    pub std_err_phi_r: f64,
    pub std_err_phi_b: f64,
    /// Root-mean-square density residual.
    pub rmse: f64,
    pub iterations: usize,
    pub n_points: usize,
}

/// Iteration limits for [`fit_amplitudes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSettings {
    pub max_iterations: usize,
    /// Relative step size at which the iteration stops.
    pub tolerance: f64,
}

fn cost(model: &TwoPhaseModel, doses: &[f64], densities: &[f64]) -> f64 {
    doses
        .iter()
        .zip(densities)
        .map(|(&d, &y)| {
            let r = y - model.density(d);
            r * r
        })
        .sum::<f64>()
        * 0.5
}

/// Normal-equation pieces `(JᵀJ, Jᵀr)` at the current model.
fn normal_equations(
    model: &TwoPhaseModel,
    doses: &[f64],
    densities: &[f64],
) -> (Matrix2<f64>, Vector2<f64>) {
    let mut jtj = Matrix2::zeros();
    let mut jtr = Vector2::zeros();
    for (&d, &y) in doses.iter().zip(densities) {
        let (gr, gb) = model.basis(d);
        let j = Vector2::new(gr, gb);
        let r = y - model.density(d);
        jtj += j * j.transpose();
        jtr += j * r;
    }
    (jtj, jtr)
}

/// Fit the amplitudes of `start` to `(dose, density)` pairs.
///
/// `start` supplies the fixed base and rates and the initial amplitudes
/// (negative starting values are projected onto the bound).
pub fn fit_amplitudes(
    channel: Channel,
    start: &TwoPhaseModel,
    doses: &[f64],
    densities: &[f64],
    settings: &FitSettings,
) -> DoseResult<ChannelFit> {
    let n = doses.len();
    if n != densities.len() {
        return Err(DoseError::InvalidShape(format!(
            "{} doses but {} densities for {} channel",
            n,
            densities.len(),
            channel
        )));
    }
    if n < 3 {
        return Err(DoseError::fit(
            channel,
            format!("only {} calibration samples in the depth window", n),
        ));
    }
    if doses.iter().chain(densities).any(|v| !v.is_finite()) {
        return Err(DoseError::fit(channel, "non-finite calibration sample"));
    }

    let mut model = start.with_amplitudes(start.phi_r.max(0.0), start.phi_b.max(0.0));
    let (jtj0, _) = normal_equations(&model, doses, densities);
    if jtj0[(0, 0)] <= 0.0 || jtj0[(1, 1)] <= 0.0 {
        return Err(DoseError::fit(
            channel,
            "reference doses carry no dose sensitivity",
        ));
    }

    let mut current_cost = cost(&model, doses, densities);
    let mut lambda = LAMBDA_INIT;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < settings.max_iterations {
        iterations += 1;
        let (jtj, jtr) = normal_equations(&model, doses, densities);
        let phi = [model.phi_r, model.phi_b];

        // Gradient of the cost is -jtr; bound parameters pushed outward stay put.
        let free = [
            !(phi[0] <= 0.0 && jtr[0] < 0.0),
            !(phi[1] <= 0.0 && jtr[1] < 0.0),
        ];

        let mut system = jtj;
        let mut rhs = jtr;
        for i in 0..2 {
            system[(i, i)] += lambda * jtj[(i, i)];
            if !free[i] {
                for k in 0..2 {
                    system[(i, k)] = 0.0;
                    system[(k, i)] = 0.0;
                }
                system[(i, i)] = 1.0;
                rhs[i] = 0.0;
            }
        }

        let step = match system.lu().solve(&rhs) {
            Some(step) => step,
            None => return Err(DoseError::fit(channel, "singular normal equations")),
        };

        let scale = (phi[0].powi(2) + phi[1].powi(2)).sqrt() + settings.tolerance;
        if step.norm() <= settings.tolerance * scale {
            converged = true;
            break;
        }

        let candidate = model.with_amplitudes(
            (phi[0] + step[0]).max(0.0),
            (phi[1] + step[1]).max(0.0),
        );
        let candidate_cost = cost(&candidate, doses, densities);

        if candidate_cost <= current_cost {
            let decrease = current_cost - candidate_cost;
            model = candidate;
            current_cost = candidate_cost;
            lambda = (lambda * 0.1).max(1e-12);
            if decrease <= settings.tolerance * settings.tolerance * (1.0 + current_cost) {
                converged = true;
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
        }
    }

    if !converged {
        return Err(DoseError::fit(
            channel,
            format!("did not converge in {} iterations", iterations),
        ));
    }
    if !(model.phi_r >= 0.0 && model.phi_b >= 0.0) {
        return Err(DoseError::fit(channel, "amplitude left its bounds"));
    }

    let rmse = (2.0 * current_cost / n as f64).sqrt();
    let (std_err_phi_r, std_err_phi_b) = if n > 2 {
        let sigma2 = 2.0 * current_cost / (n - 2) as f64;
        let (jtj, _) = normal_equations(&model, doses, densities);
        match jtj.try_inverse() {
            Some(cov) => (
                (sigma2 * cov[(0, 0)]).max(0.0).sqrt(),
                (sigma2 * cov[(1, 1)]).max(0.0).sqrt(),
            ),
            None => (f64::NAN, f64::NAN),
        }
    } else {
        (f64::NAN, f64::NAN)
    };

    Ok(ChannelFit {
        channel,
        model,
        std_err_phi_r,
        std_err_phi_b,
        rmse,
        iterations,
        n_points: n,
    })
}
