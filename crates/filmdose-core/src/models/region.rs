//! Labeled rectangular regions of a scan.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a rectangle in a single-scan-protocol digitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionLabel {
    /// The measurement film whose dose map is reconstructed.
    #[serde(alias = "film")]
    Film,
    /// The strip irradiated with the reference depth-dose distribution.
    #[serde(alias = "calibration")]
    Calibration,
    /// An unirradiated patch giving the per-channel base density.
    #[serde(alias = "background")]
    Background,
    /// A patch whose geometric center lies on the scanner lamp axis.
    #[serde(alias = "center", alias = "centre")]
    Center,
}

impl RegionLabel {
    pub const ALL: [RegionLabel; 4] = [
        RegionLabel::Film,
        RegionLabel::Calibration,
        RegionLabel::Background,
        RegionLabel::Center,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RegionLabel::Film => "Film",
            RegionLabel::Calibration => "Calibration",
            RegionLabel::Background => "Background",
            RegionLabel::Center => "Center",
        }
    }

    /// Parse a label case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "film" => Some(RegionLabel::Film),
            "calibration" => Some(RegionLabel::Calibration),
            "background" => Some(RegionLabel::Background),
            "center" | "centre" => Some(RegionLabel::Center),
            _ => None,
        }
    }
}

impl fmt::Display for RegionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named rectangle in scan pixel coordinates.
///
/// Covers rows `[top, top + height)` and columns `[left, left + width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub label: RegionLabel,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(label: RegionLabel, left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            label,
            left,
            top,
            width,
            height,
        }
    }

    /// Whether the rectangle lies fully inside an image of the given size.
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        // u64 so that huge annotations cannot wrap around
        (self.left as u64 + self.width as u64) <= image_width as u64
            && (self.top as u64 + self.height as u64) <= image_height as u64
    }

    /// Column index of the horizontal center; half-integer for even widths.
    pub fn center_column(&self) -> f64 {
        self.left as f64 + (self.width.max(1) - 1) as f64 / 2.0
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_column_is_a_pixel_index() {
        assert_eq!(Region::new(RegionLabel::Center, 100, 0, 1, 5).center_column(), 100.0);
        assert_eq!(Region::new(RegionLabel::Center, 90, 0, 21, 5).center_column(), 100.0);
        assert_eq!(Region::new(RegionLabel::Center, 90, 0, 20, 5).center_column(), 99.5);
    }
}
