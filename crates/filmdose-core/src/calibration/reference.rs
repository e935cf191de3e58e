//! Reference depth-dose table.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DoseError, DoseResult};

/// Known dose as a function of position along the calibration strip.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    /// Positions in cm, strictly increasing.
    pub positions_cm: Vec<f64>,
    /// Dose in Gy at each position.
    pub doses_gy: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ReferenceRecord {
    position_cm: f64,
    dose_gy: f64,
}

impl ReferenceTable {
    /// Build a table, sorting by position. Duplicate positions and
    /// non-finite or negative values are rejected.
    pub fn new(mut rows: Vec<(f64, f64)>) -> DoseResult<Self> {
        if rows.is_empty() {
            return Err(DoseError::config("reference dose table is empty"));
        }
        if rows
            .iter()
            .any(|(z, d)| !z.is_finite() || !d.is_finite() || *d < 0.0)
        {
            return Err(DoseError::config(
                "reference dose table contains non-finite or negative values",
            ));
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        if rows.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(DoseError::config(
                "reference dose table has duplicate positions",
            ));
        }
        let (positions_cm, doses_gy) = rows.into_iter().unzip();
        Ok(Self {
            positions_cm,
            doses_gy,
        })
    }

    /// Parse `position_cm,dose_gy` CSV with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> DoseResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (line, result) in rdr.deserialize::<ReferenceRecord>().enumerate() {
            let record = result.map_err(|e| {
                DoseError::config(format!("reference table row {}: {}", line + 1, e))
            })?;
            rows.push((record.position_cm, record.dose_gy));
        }
        Self::new(rows)
    }

    pub fn load(path: &Path) -> DoseResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            DoseError::config(format!(
                "cannot open reference table {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_csv_reader(file)
    }

    pub fn len(&self) -> usize {
        self.positions_cm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions_cm.is_empty()
    }

    /// `(position, dose)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.positions_cm
            .iter()
            .copied()
            .zip(self.doses_gy.iter().copied())
    }
}
