//! Error taxonomy for the reconstruction engine
//!
//! Region, background and calibration failures are fatal to a run and name
//! the offending region or channel. Per-pixel inversion failures are not
//! represented here: they are counted in
//! [`InversionStats`](crate::inversion::InversionStats) and surface as NaN
//! until the combiner replaces them.

use thiserror::Error;

use crate::models::{Channel, RegionLabel};
use crate::pipeline::Stage;

/// Result alias used throughout the crate.
pub type DoseResult<T> = Result<T, DoseError>;

#[derive(Debug, Error)]
pub enum DoseError {
    /// A required labeled region was not supplied.
    #[error("region '{label}' not found in annotation")]
    RegionNotFound { label: RegionLabel },

    /// A region rectangle extends past the scan extent.
    #[error(
        "region '{label}' ({width}x{height} at {left},{top}) exceeds scan extent {image_width}x{image_height}"
    )]
    RegionOutOfBounds {
        label: RegionLabel,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    /// A region was extracted but holds no pixels.
    #[error("region '{label}' is empty")]
    EmptyRegion { label: RegionLabel },

    /// Trimming the background margin leaves nothing to average.
    #[error("background margin {margin} px empties a {width}x{height} region")]
    InsufficientMargin { margin: u32, width: u32, height: u32 },

    /// The sensitometric fit for one channel did not converge or violated
    /// its constraints.
    #[error("calibration fit failed for {channel} channel: {reason}")]
    CalibrationFit { channel: Channel, reason: String },

    /// Missing or invalid configuration parameter.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input data with an unexpected shape reached a processing stage.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// A pipeline stage was requested out of order.
    #[error("pipeline stage out of order: expected {expected:?}, found {found:?}")]
    StageOrder { expected: Stage, found: Stage },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("export error: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DoseError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        DoseError::Configuration(msg.into())
    }

    pub(crate) fn fit(channel: Channel, reason: impl Into<String>) -> Self {
        DoseError::CalibrationFit {
            channel,
            reason: reason.into(),
        }
    }
}
