//! Region extraction
//!
//! Crops the four labeled sub-images of a single-scan-protocol digitization
//! out of the whole scan. Regions may overlap; labels must be unique.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DoseError, DoseResult};
use crate::models::{Region, RegionLabel, ScannedImage};
use crate::verbose_println;

/// The four regions of one scan, each addressed by its role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionLayout {
    pub film: Region,
    pub calibration: Region,
    pub background: Region,
    pub center: Region,
}

impl RegionLayout {
    /// Resolve the four required labels from an annotation list.
    pub fn from_regions(regions: &[Region]) -> DoseResult<Self> {
        for (i, region) in regions.iter().enumerate() {
            if regions[..i].iter().any(|r| r.label == region.label) {
                return Err(DoseError::config(format!(
                    "region label '{}' appears more than once",
                    region.label
                )));
            }
        }
        let find = |label: RegionLabel| {
            regions
                .iter()
                .find(|r| r.label == label)
                .copied()
                .ok_or(DoseError::RegionNotFound { label })
        };
        Ok(Self {
            film: find(RegionLabel::Film)?,
            calibration: find(RegionLabel::Calibration)?,
            background: find(RegionLabel::Background)?,
            center: find(RegionLabel::Center)?,
        })
    }

    pub fn get(&self, label: RegionLabel) -> &Region {
        match label {
            RegionLabel::Film => &self.film,
            RegionLabel::Calibration => &self.calibration,
            RegionLabel::Background => &self.background,
            RegionLabel::Center => &self.center,
        }
    }

    pub fn to_vec(&self) -> Vec<Region> {
        RegionLabel::ALL.iter().map(|&l| *self.get(l)).collect()
    }
}

/// Cropped sub-images plus the layout they came from.
#[derive(Debug, Clone)]
pub struct SegmentedScan {
    pub layout: RegionLayout,
    pub film: ScannedImage,
    pub calibration: ScannedImage,
    pub background: ScannedImage,
    pub center: ScannedImage,
    /// Full-scale intensity of the source scan.
    pub full_scale: u16,
    pub pixel_pitch_mm: Option<f64>,
}

impl SegmentedScan {
    pub fn image(&self, label: RegionLabel) -> &ScannedImage {
        match label {
            RegionLabel::Film => &self.film,
            RegionLabel::Calibration => &self.calibration,
            RegionLabel::Background => &self.background,
            RegionLabel::Center => &self.center,
        }
    }
}

/// Crop every labeled region out of `scan`.
///
/// Zero-sized regions are extracted as empty images; the stage that
/// consumes them reports [`DoseError::EmptyRegion`].
pub fn extract_regions(scan: &ScannedImage, regions: &[Region]) -> DoseResult<SegmentedScan> {
    let layout = RegionLayout::from_regions(regions)?;

    let crop = |label: RegionLabel| -> DoseResult<ScannedImage> {
        let region = layout.get(label);
        if !region.fits_within(scan.width, scan.height) {
            return Err(DoseError::RegionOutOfBounds {
                label,
                left: region.left,
                top: region.top,
                width: region.width,
                height: region.height,
                image_width: scan.width,
                image_height: scan.height,
            });
        }
        verbose_println!(
            "[REGIONS] {}: {}x{} at ({}, {})",
            label,
            region.width,
            region.height,
            region.left,
            region.top
        );
        Ok(scan.crop(region.left, region.top, region.width, region.height))
    };

    Ok(SegmentedScan {
        layout,
        film: crop(RegionLabel::Film)?,
        calibration: crop(RegionLabel::Calibration)?,
        background: crop(RegionLabel::Background)?,
        center: crop(RegionLabel::Center)?,
        full_scale: scan.full_scale,
        pixel_pitch_mm: scan.pixel_pitch_mm,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegionFile {
    List(Vec<Region>),
    Wrapped { regions: Vec<Region> },
}

/// Load a region annotation file (YAML or JSON; JSON parses as YAML).
///
/// Accepts either a bare list of regions or a map with a `regions` key.
pub fn load_regions(path: &Path) -> DoseResult<Vec<Region>> {
    let contents = fs::read_to_string(path)?;
    parse_regions(&contents)
        .map_err(|e| DoseError::config(format!("{}: {}", path.display(), e)))
}

/// Parse region annotations from YAML or JSON text.
pub fn parse_regions(contents: &str) -> DoseResult<Vec<Region>> {
    let file: RegionFile =
        serde_yaml::from_str(contents).map_err(|e| DoseError::config(e.to_string()))?;
    Ok(match file {
        RegionFile::List(regions) => regions,
        RegionFile::Wrapped { regions } => regions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_regions() -> Vec<Region> {
        vec![
            Region::new(RegionLabel::Film, 10, 0, 20, 10),
            Region::new(RegionLabel::Calibration, 0, 0, 5, 30),
            Region::new(RegionLabel::Background, 35, 0, 5, 5),
            Region::new(RegionLabel::Center, 20, 20, 4, 4),
        ]
    }

    fn gradient_scan(width: u32, height: u32) -> ScannedImage {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u16, y as u16, (x + y) as u16]);
            }
        }
        ScannedImage::new(width, height, data, 65535).unwrap()
    }

    #[test]
    fn test_extracts_all_regions() {
        let scan = gradient_scan(40, 30);
        let seg = extract_regions(&scan, &sample_regions()).unwrap();
        assert_eq!(seg.film.width, 20);
        assert_eq!(seg.film.height, 10);
        assert_eq!(seg.film.pixel(0, 0), [10, 0, 10]);
        assert_eq!(seg.center.pixel(3, 3), [23, 23, 46]);
        assert_eq!(seg.calibration.height, 30);
    }

    #[test]
    fn test_missing_label_is_reported() {
        let scan = gradient_scan(40, 30);
        let regions: Vec<Region> = sample_regions()
            .into_iter()
            .filter(|r| r.label != RegionLabel::Background)
            .collect();
        match extract_regions(&scan, &regions) {
            Err(DoseError::RegionNotFound { label }) => {
                assert_eq!(label, RegionLabel::Background)
            }
            other => panic!("expected RegionNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_bounds_names_region() {
        let scan = gradient_scan(40, 30);
        let mut regions = sample_regions();
        regions[3] = Region::new(RegionLabel::Center, 38, 28, 4, 4);
        match extract_regions(&scan, &regions) {
            Err(DoseError::RegionOutOfBounds { label, .. }) => {
                assert_eq!(label, RegionLabel::Center)
            }
            other => panic!("expected RegionOutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_sized_region_extracts_empty() {
        let scan = gradient_scan(40, 30);
        let mut regions = sample_regions();
        regions[2] = Region::new(RegionLabel::Background, 35, 0, 0, 5);
        let seg = extract_regions(&scan, &regions).unwrap();
        assert!(seg.background.is_empty());
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let scan = gradient_scan(40, 30);
        let mut regions = sample_regions();
        regions.push(Region::new(RegionLabel::Film, 0, 0, 1, 1));
        assert!(matches!(
            extract_regions(&scan, &regions),
            Err(DoseError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_regions_yaml_and_json() {
        let yaml = "regions:\n  - {label: film, left: 1, top: 2, width: 3, height: 4}\n";
        let regions = parse_regions(yaml).unwrap();
        assert_eq!(regions[0], Region::new(RegionLabel::Film, 1, 2, 3, 4));

        let json = r#"[{"label":"Center","left":0,"top":0,"width":2,"height":2}]"#;
        let regions = parse_regions(json).unwrap();
        assert_eq!(regions[0].label, RegionLabel::Center);
    }
}
