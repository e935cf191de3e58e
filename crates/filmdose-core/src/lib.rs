//! filmdose Core Library
//!
//! Reconstruction of two-dimensional absorbed-dose maps from flatbed scans
//! of radiochromic film: region extraction, background estimation,
//! denoising, sensitometric calibration, lateral response correction,
//! per-pixel dose inversion and channel combination.

pub mod background;
pub mod calibration;
pub mod combine;
pub mod config;
pub mod decoders;
pub mod denoise;
pub mod diagnostics;
pub mod error;
pub mod exporters;
pub mod interp;
pub mod inversion;
pub mod lateral;
pub mod models;
pub mod parallel;
pub mod pipeline;
pub mod regions;

// Re-export commonly used types
pub use calibration::{Calibration, ReferenceTable, ValidationReport};
pub use combine::CombineMode;
pub use config::DoseConfig;
pub use diagnostics::DoseStatistics;
pub use error::{DoseError, DoseResult};
pub use lateral::LateralCorrectionCurves;
pub use models::{
    CalibrationTable, Channel, DoseImage, Orientation, Region, RegionLabel, ScannedImage,
    TwoPhaseModel,
};
pub use parallel::ExecutionMode;
pub use pipeline::{DosePipeline, DoseRun, Stage};
