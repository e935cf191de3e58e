//! Data models for filmdose
//!
//! Scans, labeled regions, density and dose images, and the per-channel
//! sensitometric parameter sets that flow between pipeline stages.

mod calibration;
mod density;
mod dose;
mod region;
mod scan;

pub use calibration::{
    CalibrationTable, Channel, ChannelPriors, ModelPriors, RationalInverse, RationalTable,
    TwoPhaseModel,
};
pub use density::{intensity_to_density, OpticalDensityImage};
pub use dose::{ChannelDoseImage, DoseImage, Orientation};
pub use region::{Region, RegionLabel};
pub use scan::ScannedImage;
