//! Dose images.

use serde::{Deserialize, Serialize};

use super::calibration::Channel;

/// Per-channel dose estimates, shape `(rows, cols, 3)`, row-major and
/// interleaved like the scan it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDoseImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f64>,
}

impl ChannelDoseImage {
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f64; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Single-channel view copied out as its own plane.
    pub fn channel_plane(&self, channel: Channel) -> Vec<f64> {
        self.data
            .chunks_exact(3)
            .map(|px| px[channel.index()])
            .collect()
    }
}

/// Final absorbed-dose map (Gy), one value per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f64>,
}

/// The eight axis-aligned orientations of a dose plane.
///
/// Rotations are counter-clockwise. Mirrored variants flip left/right first
/// and then rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Original,
    Rot90,
    Rot180,
    Rot270,
    Mirror,
    MirrorRot90,
    MirrorRot180,
    MirrorRot270,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Original,
        Orientation::Rot90,
        Orientation::Rot180,
        Orientation::Rot270,
        Orientation::Mirror,
        Orientation::MirrorRot90,
        Orientation::MirrorRot180,
        Orientation::MirrorRot270,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Original => "original",
            Orientation::Rot90 => "rot90",
            Orientation::Rot180 => "rot180",
            Orientation::Rot270 => "rot270",
            Orientation::Mirror => "mirror",
            Orientation::MirrorRot90 => "mirror-rot90",
            Orientation::MirrorRot180 => "mirror-rot180",
            Orientation::MirrorRot270 => "mirror-rot270",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase().replace('_', "-");
        if s == "identity" || s == "none" {
            return Some(Orientation::Original);
        }
        Orientation::ALL.into_iter().find(|o| o.as_str() == s)
    }

    fn decompose(self) -> (bool, u8) {
        match self {
            Orientation::Original => (false, 0),
            Orientation::Rot90 => (false, 1),
            Orientation::Rot180 => (false, 2),
            Orientation::Rot270 => (false, 3),
            Orientation::Mirror => (true, 0),
            Orientation::MirrorRot90 => (true, 1),
            Orientation::MirrorRot180 => (true, 2),
            Orientation::MirrorRot270 => (true, 3),
        }
    }
}

impl DoseImage {
    pub fn new(width: u32, height: u32, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    /// Copy of the image in the requested orientation.
    pub fn reoriented(&self, orientation: Orientation) -> DoseImage {
        let (mirror, turns) = orientation.decompose();
        let mut out = if mirror {
            self.flipped_lr()
        } else {
            self.clone()
        };
        for _ in 0..turns {
            out = out.rotated_ccw();
        }
        out
    }

    fn flipped_lr(&self) -> DoseImage {
        let w = self.width as usize;
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(w.max(1)) {
            data.extend(row.iter().rev());
        }
        DoseImage::new(self.width, self.height, data)
    }

    // out[i][j] = in[j][w - 1 - i]; output is w rows by h columns.
    fn rotated_ccw(&self) -> DoseImage {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = Vec::with_capacity(self.data.len());
        for i in 0..w {
            for j in 0..h {
                data.push(self.data[j * w + (w - 1 - i)]);
            }
        }
        DoseImage::new(self.height, self.width, data)
    }
}
