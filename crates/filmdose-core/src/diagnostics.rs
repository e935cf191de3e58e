//! Summary statistics for dose maps

use serde::{Deserialize, Serialize};

use crate::models::DoseImage;

/// Percentiles reported alongside every dose summary.
pub const REPORTED_PERCENTILES: [u8; 7] = [1, 5, 25, 50, 75, 95, 99];

/// Distribution summary of a dose map, Gy.
///
/// Non-finite values are excluded and counted separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseStatistics {
    pub count: usize,
    pub non_finite: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub percentiles: Vec<(u8, f64)>,
}

impl DoseStatistics {
    pub fn from_image(image: &DoseImage) -> Self {
        Self::from_values(&image.data)
    }

    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let non_finite = values.len() - sorted.len();
        if sorted.is_empty() {
            return Self {
                count: 0,
                non_finite,
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                median: f64::NAN,
                std_dev: f64::NAN,
                percentiles: Vec::new(),
            };
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let percentiles = REPORTED_PERCENTILES
            .iter()
            .map(|&p| (p, percentile(&sorted, p as f64)))
            .collect();

        Self {
            count: sorted.len(),
            non_finite,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            median: percentile(&sorted, 50.0),
            std_dev: variance.sqrt(),
            percentiles,
        }
    }

    pub fn percentile(&self, p: u8) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(q, _)| *q == p)
            .map(|&(_, v)| v)
    }
}

/// Linearly interpolated percentile of ascending `sorted` data.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let t = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * t
}
