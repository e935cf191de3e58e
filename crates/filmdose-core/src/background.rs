//! Background (base) density estimation
//!
//! The unirradiated patch gives the per-channel base optical density `f`
//! that the sensitometric fit holds fixed.

use crate::error::{DoseError, DoseResult};
use crate::models::{intensity_to_density, Channel, RegionLabel, ScannedImage};
use crate::verbose_println;

/// Per-channel base optical density.
pub type BaseDensities = [f64; 3];

/// Mean density of `image` after trimming `margin` pixels from every edge.
///
/// The mean is taken over intensities first and converted to density once,
/// so a uniform patch yields exactly `log10(full_scale / I0)`.
pub fn estimate_background(image: &ScannedImage, margin: u32) -> DoseResult<BaseDensities> {
    if image.is_empty() {
        return Err(DoseError::EmptyRegion {
            label: RegionLabel::Background,
        });
    }

    let trim = margin as u64 * 2;
    if trim >= image.width as u64 || trim >= image.height as u64 {
        return Err(DoseError::InsufficientMargin {
            margin,
            width: image.width,
            height: image.height,
        });
    }

    let inner = image.crop(
        margin,
        margin,
        image.width - 2 * margin,
        image.height - 2 * margin,
    );
    let means = inner.channel_means();
    let full_scale = image.full_scale as f64;

    let mut base = [0.0; 3];
    for channel in Channel::ALL {
        let density = intensity_to_density(means[channel.index()], full_scale);
        if !density.is_finite() {
            return Err(DoseError::config(format!(
                "{} region has zero mean intensity in {} channel",
                RegionLabel::Background.as_str(),
                channel
            )));
        }
        base[channel.index()] = density;
    }

    verbose_println!(
        "[BACKGROUND] {}x{} patch, margin {}: base OD = [{:.5}, {:.5}, {:.5}]",
        inner.width,
        inner.height,
        margin,
        base[0],
        base[1],
        base[2]
    );
    Ok(base)
}
