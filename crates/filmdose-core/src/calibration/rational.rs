//! Rational approximation of the inverse response, used to seed inversion.
//!
//! `density = a + b / (dose - c)` rearranges to the linear relation
//! `density * dose = a * dose + c * density + (b - a * c)`, so `(a, c, k)`
//! with `k = b - a * c` come from one linear least-squares solve.

use nalgebra::{Matrix3, Vector3};

use crate::error::{DoseError, DoseResult};
use crate::models::{Channel, RationalInverse, TwoPhaseModel};

/// Seed doses spanning `[0, max_dose]` in `count` even steps.
pub fn seed_doses(max_dose: f64, count: usize) -> Vec<f64> {
    if count < 2 {
        return vec![0.0; count];
    }
    let step = max_dose / (count - 1) as f64;
    (0..count).map(|i| i as f64 * step).collect()
}

/// Fit a [`RationalInverse`] to `model` sampled at `seeds`.
pub fn fit_rational(
    channel: Channel,
    model: &TwoPhaseModel,
    seeds: &[f64],
) -> DoseResult<RationalInverse> {
    if seeds.len() < 3 {
        return Err(DoseError::fit(
            channel,
            "rational inverse needs at least 3 seed doses",
        ));
    }
    solve_rational(
        channel,
        seeds.iter().map(|&dose| (dose, model.density(dose))),
    )
}

fn solve_rational(
    channel: Channel,
    pairs: impl Iterator<Item = (f64, f64)>,
) -> DoseResult<RationalInverse> {
    let mut ata = Matrix3::zeros();
    let mut atb = Vector3::zeros();
    for (dose, density) in pairs {
        let row = Vector3::new(dose, density, 1.0);
        ata += row * row.transpose();
        atb += row * (density * dose);
    }

    let solution = ata
        .lu()
        .solve(&atb)
        .ok_or_else(|| DoseError::fit(channel, "rational inverse seeds are degenerate"))?;
    let (a, c, k) = (solution[0], solution[1], solution[2]);
    let b = k + a * c;

    if ![a, b, c].iter().all(|v| v.is_finite()) {
        return Err(DoseError::fit(channel, "rational inverse is not finite"));
    }
    Ok(RationalInverse { a, b, c })
}
