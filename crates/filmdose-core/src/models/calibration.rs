//! Sensitometric model types.
//!
//! The film response per color channel is the sum of two saturating
//! polymerization phases on top of the unirradiated base density:
//!
//! ```text
//! density(D) = f + phi_r * (1 - exp(-k_r * D)) + phi_b * (1 - exp(-k_b * D))
//! ```
//!
//! `f` comes from the background patch, `k_r` and `k_b` are
//! instrument-characterized constants for a scanner and film model, and only
//! the amplitudes `phi_r` and `phi_b` are refit for each scan.

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

/// Color channel of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instrument-characterized constants and starting amplitudes for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelPriors {
    /// Rate constant of the fast phase (1/Gy).
    pub k_r: f64,
    /// Rate constant of the slow phase (1/Gy).
    pub k_b: f64,
    /// Starting amplitude of the fast phase.
    pub phi_r: f64,
    /// Starting amplitude of the slow phase.
    pub phi_b: f64,
}

/// Priors for all three channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPriors {
    pub red: ChannelPriors,
    pub green: ChannelPriors,
    pub blue: ChannelPriors,
}

impl ModelPriors {
    pub fn channel(&self, channel: Channel) -> &ChannelPriors {
        match channel {
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
        }
    }
}

impl Default for ModelPriors {
    // Representative values for an EBT3-type film on a flatbed scanner in
    // transmission mode. Real runs supply characterized constants.
    fn default() -> Self {
        Self {
            red: ChannelPriors {
                k_r: 0.35,
                k_b: 0.05,
                phi_r: 0.35,
                phi_b: 0.45,
            },
            green: ChannelPriors {
                k_r: 0.25,
                k_b: 0.04,
                phi_r: 0.25,
                phi_b: 0.40,
            },
            blue: ChannelPriors {
                k_r: 0.20,
                k_b: 0.03,
                phi_r: 0.10,
                phi_b: 0.25,
            },
        }
    }
}

/// Two-phase saturating growth model for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoPhaseModel {
    /// Base optical density `f`.
    pub base: f64,
    pub phi_r: f64,
    pub k_r: f64,
    pub phi_b: f64,
    pub k_b: f64,
}

impl TwoPhaseModel {
    pub fn from_priors(base: f64, priors: &ChannelPriors) -> Self {
        Self {
            base,
            phi_r: priors.phi_r,
            k_r: priors.k_r,
            phi_b: priors.phi_b,
            k_b: priors.k_b,
        }
    }

    /// Copy with replaced amplitudes; rates and base are unchanged.
    pub fn with_amplitudes(&self, phi_r: f64, phi_b: f64) -> Self {
        Self {
            phi_r,
            phi_b,
            ..*self
        }
    }

    /// Saturating growth of each phase at `dose`: `(1 - e^{-k_r D}, 1 - e^{-k_b D})`.
    #[inline]
    pub fn basis(&self, dose: f64) -> (f64, f64) {
        (
            1.0 - (-self.k_r * dose).exp(),
            1.0 - (-self.k_b * dose).exp(),
        )
    }

    /// Optical density predicted at `dose` (Gy).
    #[inline]
    pub fn density(&self, dose: f64) -> f64 {
        let (gr, gb) = self.basis(dose);
        self.base + self.phi_r * gr + self.phi_b * gb
    }

    /// d(density)/d(dose).
    #[inline]
    pub fn slope(&self, dose: f64) -> f64 {
        self.phi_r * self.k_r * (-self.k_r * dose).exp()
            + self.phi_b * self.k_b * (-self.k_b * dose).exp()
    }

    /// Asymptotic density as dose grows without bound.
    pub fn saturation_density(&self) -> f64 {
        self.base + self.phi_r + self.phi_b
    }
}

/// Three-parameter rational approximation of the dose response,
/// `density(D) = a + b / (D - c)`, used only to seed exact inversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RationalInverse {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl RationalInverse {
    #[inline]
    pub fn density(&self, dose: f64) -> f64 {
        self.a + self.b / (dose - self.c)
    }

    /// Approximate dose for `density`. Non-finite when `density == a`.
    #[inline]
    pub fn dose(&self, density: f64) -> f64 {
        self.c + self.b / (density - self.a)
    }
}

/// One [`TwoPhaseModel`] per channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    pub channels: [TwoPhaseModel; 3],
}

impl CalibrationTable {
    pub fn new(red: TwoPhaseModel, green: TwoPhaseModel, blue: TwoPhaseModel) -> Self {
        Self {
            channels: [red, green, blue],
        }
    }

    pub fn get(&self, channel: Channel) -> &TwoPhaseModel {
        &self.channels[channel.index()]
    }

    /// Per-channel predicted densities at `dose`.
    pub fn densities(&self, dose: f64) -> [f64; 3] {
        [
            self.channels[0].density(dose),
            self.channels[1].density(dose),
            self.channels[2].density(dose),
        ]
    }
}

impl Index<Channel> for CalibrationTable {
    type Output = TwoPhaseModel;

    fn index(&self, channel: Channel) -> &TwoPhaseModel {
        self.get(channel)
    }
}

/// One [`RationalInverse`] per channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RationalTable {
    pub channels: [RationalInverse; 3],
}

impl Index<Channel> for RationalTable {
    type Output = RationalInverse;

    fn index(&self, channel: Channel) -> &RationalInverse {
        &self.channels[channel.index()]
    }
}
