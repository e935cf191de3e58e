//! Piecewise-linear interpolation over sampled curves.

use crate::error::{DoseError, DoseResult};

/// Linear interpolant over strictly increasing sample positions.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearInterpolant {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl LinearInterpolant {
    /// Build an interpolant. Non-finite samples are dropped; the remaining
    /// positions must be strictly increasing.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> DoseResult<Self> {
        if xs.len() != ys.len() {
            return Err(DoseError::InvalidShape(format!(
                "interpolant has {} positions but {} values",
                xs.len(),
                ys.len()
            )));
        }
        let (xs, ys): (Vec<f64>, Vec<f64>) = xs
            .into_iter()
            .zip(ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .unzip();
        if xs.is_empty() {
            return Err(DoseError::InvalidShape(
                "interpolant has no finite samples".to_string(),
            ));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(DoseError::InvalidShape(
                "interpolant positions must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { xs, ys })
    }

    /// A curve equal to `value` everywhere.
    pub fn constant(value: f64) -> Self {
        Self {
            xs: vec![0.0],
            ys: vec![value],
        }
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Value at `x`, or `None` outside the sampled domain.
    pub fn eval(&self, x: f64) -> Option<f64> {
        let (lo, hi) = self.domain();
        if !x.is_finite() || x < lo || x > hi {
            return None;
        }
        Some(self.interpolate(x))
    }

    /// Value at `x`, holding the end values constant outside the domain.
    pub fn eval_clamped(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        self.interpolate(x.clamp(lo, hi))
    }

    fn interpolate(&self, x: f64) -> f64 {
        // first index with xs[i] > x
        let upper = self.xs.partition_point(|&v| v <= x);
        if upper == 0 {
            return self.ys[0];
        }
        if upper >= self.xs.len() {
            return self.ys[self.ys.len() - 1];
        }
        let (x0, x1) = (self.xs[upper - 1], self.xs[upper]);
        let (y0, y1) = (self.ys[upper - 1], self.ys[upper]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}
