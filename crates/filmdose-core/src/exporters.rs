//! Exporters for dose maps, extracted regions and run reports
//!
//! Dose maps are written as 32-bit float grayscale TIFFs in Gy. Regions are
//! written as 16-bit RGB TIFFs. Both carry the scan's pixel pitch in their
//! resolution tags so they can be re-read with [`crate::decoders::decode_scan`]
//! or opened in a planning system at the right scale.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tiff::encoder::{colortype, Rational, TiffEncoder};
use tiff::tags::ResolutionUnit;

use crate::background::BaseDensities;
use crate::calibration::{Calibration, ValidationReport};
use crate::combine::CombineMode;
use crate::config::DoseConfig;
use crate::diagnostics::DoseStatistics;
use crate::error::{DoseError, DoseResult};
use crate::inversion::InversionStats;
use crate::models::{DoseImage, Orientation, ScannedImage};
use crate::pipeline::DoseRun;
use crate::regions::RegionLayout;

const RESOLUTION_DENOMINATOR: u32 = 1000;

fn export_err(context: &str, e: impl std::fmt::Display) -> DoseError {
    DoseError::Export(format!("{}: {}", context, e))
}

fn create_writer(path: &Path) -> DoseResult<BufWriter<File>> {
    let file = File::create(path)
        .map_err(|e| export_err(&format!("failed to create {}", path.display()), e))?;
    Ok(BufWriter::new(file))
}

/// Pixels per centimetre for a pitch in millimetres, as a TIFF rational.
fn resolution_per_cm(pixel_pitch_mm: f64) -> Option<Rational> {
    if !(pixel_pitch_mm.is_finite() && pixel_pitch_mm > 0.0) {
        return None;
    }
    let scaled = (10.0 / pixel_pitch_mm * RESOLUTION_DENOMINATOR as f64).round();
    if scaled < 1.0 || scaled > u32::MAX as f64 {
        return None;
    }
    Some(Rational {
        n: scaled as u32,
        d: RESOLUTION_DENOMINATOR,
    })
}

fn write_tiff<C: colortype::ColorType>(
    path: &Path,
    width: u32,
    height: u32,
    data: &[C::Inner],
    pixel_pitch_mm: Option<f64>,
) -> DoseResult<()>
where
    [C::Inner]: tiff::encoder::TiffValue,
{
    let mut encoder = TiffEncoder::new(create_writer(path)?)
        .map_err(|e| export_err("failed to create TIFF encoder", e))?;
    let mut image = encoder
        .new_image::<C>(width, height)
        .map_err(|e| export_err("failed to start TIFF image", e))?;

    if let Some(Rational { n, d }) = pixel_pitch_mm.and_then(resolution_per_cm) {
        image.resolution_unit(ResolutionUnit::Centimeter);
        image.x_resolution(Rational { n, d });
        image.y_resolution(Rational { n, d });
    }

    image
        .write_data(data)
        .map_err(|e| export_err("failed to write TIFF image", e))
}

/// Write a dose map as a single-channel 32-bit float TIFF (Gy).
pub fn export_dose_tiff<P: AsRef<Path>>(
    dose: &DoseImage,
    path: P,
    pixel_pitch_mm: Option<f64>,
) -> DoseResult<()> {
    if dose.width == 0 || dose.height == 0 {
        return Err(DoseError::Export("dose map is empty".to_string()));
    }
    let data: Vec<f32> = dose.data.iter().map(|&v| v as f32).collect();
    write_tiff::<colortype::Gray32Float>(
        path.as_ref(),
        dose.width,
        dose.height,
        &data,
        pixel_pitch_mm,
    )
}

/// Write an extracted region as a 16-bit RGB TIFF.
///
/// 8-bit sources are rescaled to the 16-bit range.
pub fn export_region_tiff<P: AsRef<Path>>(image: &ScannedImage, path: P) -> DoseResult<()> {
    if image.is_empty() {
        return Err(DoseError::Export("region is empty".to_string()));
    }
    let data: Vec<u16> = if image.full_scale == u16::MAX {
        image.data.clone()
    } else {
        let scale = u16::MAX as f64 / image.full_scale as f64;
        image
            .data
            .iter()
            .map(|&v| (v as f64 * scale).round().min(u16::MAX as f64) as u16)
            .collect()
    };
    write_tiff::<colortype::RGB16>(
        path.as_ref(),
        image.width,
        image.height,
        &data,
        image.pixel_pitch_mm,
    )
}

/// Machine-readable summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct DoseReport {
    pub dose_width: u32,
    pub dose_height: u32,
    pub orientation: Orientation,
    pub pixel_pitch_mm: f64,
    pub layout: RegionLayout,
    pub base_densities: BaseDensities,
    pub calibration: Calibration,
    pub validation: ValidationReport,
    pub inversion: InversionStats,
    pub combine_mode: CombineMode,
    pub weights: [f64; 3],
    pub dmax: Option<f64>,
    pub statistics: DoseStatistics,
    /// Hex digest of the configuration the run used.
    pub config_fingerprint: String,
}

impl DoseReport {
    /// Summarize `run`. `dose` is the map as exported, possibly reoriented.
    pub fn from_run(
        run: &DoseRun,
        config: &DoseConfig,
        dose: &DoseImage,
        orientation: Orientation,
    ) -> Self {
        Self {
            dose_width: dose.width,
            dose_height: dose.height,
            orientation,
            pixel_pitch_mm: run.pixel_pitch_mm,
            layout: run.layout,
            base_densities: run.base,
            calibration: run.calibration.clone(),
            validation: run.validation.clone(),
            inversion: run.inversion_stats,
            combine_mode: config.combine.mode,
            weights: config.combine.weights,
            dmax: config.combine.dmax,
            statistics: DoseStatistics::from_image(dose),
            config_fingerprint: format!("{:016x}", run.config_fingerprint),
        }
    }
}

/// Serialize any report as pretty JSON.
pub fn write_json_report<T: Serialize, P: AsRef<Path>>(report: &T, path: P) -> DoseResult<()> {
    let mut writer = create_writer(path.as_ref())?;
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| export_err("failed to serialize report", e))?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| export_err("failed to write report", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::decode_scan;
    use std::fs;
    use tempfile::tempdir;

    fn read_gray_f32(path: &Path) -> (u32, u32, Vec<f32>) {
        let file = std::io::BufReader::new(File::open(path).unwrap());
        let mut decoder = tiff::decoder::Decoder::new(file).unwrap();
        let (w, h) = decoder.dimensions().unwrap();
        match decoder.read_image().unwrap() {
            tiff::decoder::DecodingResult::F32(buf) => (w, h, buf),
            _ => panic!("expected f32 samples"),
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    #[test]
    fn test_resolution_per_cm() {
        let r = resolution_per_cm(0.0846667).unwrap();
        assert_eq!(r.d, 1000);
        assert!((r.n as f64 / 1000.0 - 118.11).abs() < 0.01);

        assert!(resolution_per_cm(0.0).is_none());
        assert!(resolution_per_cm(f64::NAN).is_none());
    }

    // ========================================================================
    // Dose TIFF
    // ========================================================================

    #[test]
    fn test_export_dose_tiff_roundtrip_values() {
        let dose = DoseImage::new(3, 2, vec![0.0, 0.5, 1.25, 2.0, 7.5, 10.0]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("dose.tif");

        export_dose_tiff(&dose, &path, Some(0.5)).unwrap();

        let (w, h, data) = read_gray_f32(&path);
        assert_eq!((w, h), (3, 2));
        assert_eq!(data, vec![0.0, 0.5, 1.25, 2.0, 7.5, 10.0]);
    }

    #[test]
    fn test_export_empty_dose_fails() {
        let dir = tempdir().unwrap();
        let empty = DoseImage::new(0, 0, vec![]);
        let result = export_dose_tiff(&empty, dir.path().join("x.tif"), None);
        assert!(matches!(result, Err(DoseError::Export(_))));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("dose.tif");
        let dose = DoseImage::new(1, 1, vec![1.0]);
        assert!(matches!(
            export_dose_tiff(&dose, &path, None),
            Err(DoseError::Export(_))
        ));
    }

    // ========================================================================
    // Region TIFF
    // ========================================================================

    #[test]
    fn test_region_tiff_reads_back_with_pitch() {
        let region = ScannedImage::uniform(4, 3, [100, 20000, 65535], 65535).with_pixel_pitch(0.5);
        let dir = tempdir().unwrap();
        let path = dir.path().join("film.tif");

        export_region_tiff(&region, &path).unwrap();
        let decoded = decode_scan(&path).unwrap();

        assert_eq!(decoded.data, region.data);
        assert_eq!(decoded.full_scale, 65535);
        assert!((decoded.pixel_pitch_mm.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_region_tiff_rescales_8bit_sources() {
        let region = ScannedImage::uniform(2, 2, [0, 128, 255], 255);
        let dir = tempdir().unwrap();
        let path = dir.path().join("center.tiff");

        export_region_tiff(&region, &path).unwrap();
        let decoded = decode_scan(&path).unwrap();

        assert_eq!(decoded.pixel(1, 1), [0, 32896, 65535]);
        assert_eq!(decoded.pixel_pitch_mm, None);
    }

    // ========================================================================
    // JSON report
    // ========================================================================

    #[test]
    fn test_write_json_report() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let stats = DoseStatistics::from_values(&[1.0, 2.0, 3.0]);

        write_json_report(&stats, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["count"], 3);
        assert_eq!(value["median"], 2.0);
        assert!(text.ends_with('\n'));
    }
}
