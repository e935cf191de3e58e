//! Tests for the dose reconstruction pipeline
//!
//! Every test builds a synthetic scan: a vertical calibration strip exposed
//! to a known depth-dose curve, a uniform background patch, a film region
//! and a center patch.

use std::fs;

use super::*;
use crate::combine::CombineMode;
use crate::models::{Channel, ModelPriors, TwoPhaseModel};

const FULL_SCALE: u16 = 65535;
const BACKGROUND: [u16; 3] = [52000, 50000, 33000];
const SCAN_WIDTH: u32 = 64;
const SCAN_HEIGHT: u32 = 160;
const STRIP_TOP: u32 = 5;
const STRIP_ROWS: u32 = 150;

fn base_density(c: usize) -> f64 {
    (FULL_SCALE as f64 / BACKGROUND[c] as f64).log10()
}

fn truth() -> CalibrationTable {
    let priors = ModelPriors::default();
    let model = |c: Channel, phi_r: f64, phi_b: f64| {
        TwoPhaseModel::from_priors(base_density(c.index()), priors.channel(c))
            .with_amplitudes(phi_r, phi_b)
    };
    CalibrationTable::new(
        model(Channel::Red, 0.30, 0.55),
        model(Channel::Green, 0.22, 0.35),
        model(Channel::Blue, 0.12, 0.20),
    )
}

fn depth_dose(z_cm: f64) -> f64 {
    8.0 * (-0.06 * z_cm).exp()
}

fn reference() -> ReferenceTable {
    ReferenceTable::new(
        (0..=60)
            .map(|k| {
                let z = k as f64 * 0.25;
                (z, depth_dose(z))
            })
            .collect(),
    )
    .unwrap()
}

fn intensity(density: f64) -> u16 {
    (FULL_SCALE as f64 * 10f64.powf(-density)).round() as u16
}

fn regions() -> Vec<Region> {
    vec![
        Region::new(RegionLabel::Calibration, 0, STRIP_TOP, 10, STRIP_ROWS),
        Region::new(RegionLabel::Background, 14, 0, 30, 30),
        Region::new(RegionLabel::Film, 14, 40, 24, 16),
        Region::new(RegionLabel::Center, 44, 100, 20, 20),
    ]
}

/// Scan with the film uniformly exposed to `film_dose`.
fn synthetic_scan(film_dose: f64) -> ScannedImage {
    let truth = truth();
    let film_rgb = truth.densities(film_dose).map(intensity);
    let mut data = Vec::with_capacity((SCAN_WIDTH * SCAN_HEIGHT * 3) as usize);
    for y in 0..SCAN_HEIGHT {
        for x in 0..SCAN_WIDTH {
            let rgb = if x < 10 && (STRIP_TOP..STRIP_TOP + STRIP_ROWS).contains(&y) {
                let z_cm = (y - STRIP_TOP) as f64 / 10.0;
                truth.densities(depth_dose(z_cm)).map(intensity)
            } else if (14..38).contains(&x) && (40..56).contains(&y) {
                film_rgb
            } else {
                BACKGROUND
            };
            data.extend_from_slice(&rgb);
        }
    }
    ScannedImage::new(SCAN_WIDTH, SCAN_HEIGHT, data, FULL_SCALE)
        .unwrap()
        .with_pixel_pitch(1.0)
}

fn config() -> DoseConfig {
    let mut config = DoseConfig::default();
    config.combine.dmax = Some(10.0);
    config.lateral.enabled = false;
    config.denoise.enabled = false;
    config
}

fn pipeline(config: DoseConfig) -> DosePipeline {
    DosePipeline::new(config, reference(), LateralCorrectionCurves::identity()).unwrap()
}

// ========================================================================
// End-to-end
// ========================================================================

#[test]
fn test_uniform_film_reconstructs_known_dose() {
    let mut pipeline = pipeline(config());
    let run = pipeline.run(&synthetic_scan(3.0), &regions()).unwrap();

    assert_eq!(pipeline.stage(), Stage::Combined);
    assert_eq!(run.dose.width, 24);
    assert_eq!(run.dose.height, 16);
    assert_eq!(run.inversion_stats.total_failures(), 0);
    for &v in &run.dose.data {
        assert!((v - 3.0).abs() < 0.01, "dose {}", v);
    }
}

#[test]
fn test_uniform_background_gives_exact_base() {
    let mut pipeline = pipeline(config());
    let run = pipeline.run(&synthetic_scan(2.0), &regions()).unwrap();
    for c in 0..3 {
        assert_eq!(run.base[c], base_density(c));
    }
}

#[test]
fn test_calibration_recovers_generating_model() {
    let mut pipeline = pipeline(config());
    let run = pipeline.run(&synthetic_scan(2.0), &regions()).unwrap();
    let truth = truth();
    for channel in Channel::ALL {
        let fitted = run.calibration.table[channel];
        assert!((fitted.phi_r - truth[channel].phi_r).abs() < 1e-3);
        assert!((fitted.phi_b - truth[channel].phi_b).abs() < 1e-3);
    }
    assert_eq!(run.validation.fraction_within, 1.0);
    assert_eq!(run.pixel_pitch_mm, 1.0);
    assert_eq!(run.config_fingerprint, config().fingerprint());
}

#[test]
fn test_red_mode_validation_uses_red_channel_only() {
    let mut config = config();
    config.combine.mode = CombineMode::Red;
    let mut pipeline = pipeline(config);
    let run = pipeline.run(&synthetic_scan(2.0), &regions()).unwrap();

    assert!(!run.validation.points.is_empty());
    for point in &run.validation.points {
        let red = point.channel_doses[Channel::Red.index()];
        assert_eq!(point.reconstructed_dose, red.clamp(0.0, 10.0));
    }
    assert_eq!(run.validation.fraction_within, 1.0);
    for &v in &run.dose.data {
        assert!((v - 2.0).abs() < 0.01, "dose {}", v);
    }
}

#[test]
fn test_denoised_run_stays_close() {
    let mut config = config();
    config.denoise.enabled = true;
    let mut pipeline = pipeline(config);
    let run = pipeline.run(&synthetic_scan(3.0), &regions()).unwrap();
    for &v in &run.dose.data {
        assert!((v - 3.0).abs() < 0.05, "dose {}", v);
    }
}

#[test]
fn test_parallel_and_sequential_runs_match() {
    let scan = synthetic_scan(4.0);
    let mut sequential = pipeline(config()).with_execution_mode(ExecutionMode::Sequential);
    let mut parallel = pipeline(config()).with_execution_mode(ExecutionMode::Parallel);
    let a = sequential.run(&scan, &regions()).unwrap();
    let b = parallel.run(&scan, &regions()).unwrap();
    for (x, y) in a.dose.data.iter().zip(&b.dose.data) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn test_saturated_pixels_are_counted_and_clamped() {
    let mut scan = synthetic_scan(3.0);
    // darkest possible sample at film pixel (5, 3)
    let idx = ((40 + 3) * SCAN_WIDTH + 14 + 5) as usize * 3;
    scan.data[idx..idx + 3].copy_from_slice(&[1, 1, 1]);

    let mut pipeline = pipeline(config());
    let run = pipeline.run(&scan, &regions()).unwrap();
    assert_eq!(run.inversion_stats.failures, [1, 1, 1]);
    assert_eq!(run.dose.get(5, 3), 10.0);
    assert!((run.dose.get(6, 3) - 3.0).abs() < 0.01);
}

// ========================================================================
// Lateral correction
// ========================================================================

#[test]
fn test_lateral_correction_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let reference_path = dir.path().join("reference.csv");
    let mut csv = String::from("position_cm,dose_gy\n");
    for (z, d) in reference().iter() {
        csv.push_str(&format!("{},{}\n", z, d));
    }
    fs::write(&reference_path, csv).unwrap();

    let curve_path = dir.path().join("curves.yml");
    let falling = "{positions: [0, 100], phi_r: [1.0, 0.8], phi_b: [1.0, 0.8]}";
    fs::write(
        &curve_path,
        format!("unit: mm\nred: {0}\ngreen: {0}\nblue: {0}\n", falling),
    )
    .unwrap();

    let mut config = config();
    config.calibration.reference_table = Some(reference_path);
    config.lateral.enabled = true;
    config.lateral.curve_file = Some(curve_path);

    let mut pipeline = DosePipeline::from_config(config).unwrap();
    let run = pipeline.run(&synthetic_scan(3.0), &regions()).unwrap();

    // Axis at column 53.5, strip at column 4.5: every film column sits closer
    // to the axis than the strip, and reads progressively lower dose.
    for y in 0..run.dose.height {
        for x in 0..run.dose.width - 1 {
            let here = run.dose.get(x, y);
            assert!(here < 3.0);
            assert!(run.dose.get(x + 1, y) < here);
        }
    }
    let tables = pipeline.column_tables().unwrap();
    assert_eq!(tables.len(), 24);
    assert!(tables[23][Channel::Red].phi_r > tables[0][Channel::Red].phi_r);
}

#[test]
fn test_from_config_requires_reference_table() {
    assert!(matches!(
        DosePipeline::from_config(config()),
        Err(DoseError::Configuration(_))
    ));
}

// ========================================================================
// Stage ordering and failures
// ========================================================================

#[test]
fn test_stages_cannot_be_skipped() {
    let mut pipeline = pipeline(config());
    match pipeline.calibrate() {
        Err(DoseError::StageOrder { expected, found }) => {
            assert_eq!(expected, Stage::Denoised);
            assert_eq!(found, Stage::Idle);
        }
        other => panic!("expected stage order error, got {:?}", other.map(|_| ())),
    }

    pipeline.extract(&synthetic_scan(1.0), &regions()).unwrap();
    assert!(matches!(
        pipeline.extract(&synthetic_scan(1.0), &regions()),
        Err(DoseError::StageOrder { .. })
    ));
    assert_eq!(pipeline.stage(), Stage::Extracted);
}

#[test]
fn test_stepwise_run_and_reset() {
    let mut pipeline = pipeline(config());
    pipeline.extract(&synthetic_scan(2.0), &regions()).unwrap();
    pipeline.estimate_background().unwrap();
    pipeline.denoise().unwrap();
    pipeline.calibrate().unwrap();
    assert!(pipeline.validate().is_ok());
    assert_eq!(pipeline.correct_lateral().unwrap().len(), 24);
    pipeline.invert().unwrap();
    assert!(pipeline.dose().is_none());
    pipeline.combine().unwrap();
    assert!(pipeline.dose().is_some());

    pipeline.reset();
    assert_eq!(pipeline.stage(), Stage::Idle);
    assert!(pipeline.calibration().is_none());
    assert!(pipeline.validate().is_err());
}

#[test]
fn test_missing_pixel_pitch_is_configuration_error() {
    let mut scan = synthetic_scan(2.0);
    scan.pixel_pitch_mm = None;
    let mut pipeline = pipeline(config());
    assert!(matches!(
        pipeline.extract(&scan, &regions()),
        Err(DoseError::Configuration(_))
    ));
    assert_eq!(pipeline.stage(), Stage::Idle);
}

#[test]
fn test_configured_pixel_pitch_fills_in() {
    let mut scan = synthetic_scan(2.0);
    scan.pixel_pitch_mm = None;
    let mut config = config();
    config.scanner.pixel_pitch_mm = Some(1.0);
    let mut pipeline = pipeline(config);
    let run = pipeline.run(&scan, &regions()).unwrap();
    assert_eq!(run.pixel_pitch_mm, 1.0);
}

#[test]
fn test_empty_film_region_halts_before_calibration() {
    let mut regions = regions();
    regions[2] = Region::new(RegionLabel::Film, 14, 40, 0, 16);
    let mut pipeline = pipeline(config());
    assert!(matches!(
        pipeline.run(&synthetic_scan(2.0), &regions),
        Err(DoseError::EmptyRegion {
            label: RegionLabel::Film
        })
    ));
    assert_eq!(pipeline.stage(), Stage::BackgroundKnown);
    assert!(pipeline.dose().is_none());
}

#[test]
fn test_region_out_of_bounds_names_region() {
    let mut regions = regions();
    regions[3] = Region::new(RegionLabel::Center, 50, 100, 20, 20);
    let mut pipeline = pipeline(config());
    assert!(matches!(
        pipeline.run(&synthetic_scan(2.0), &regions),
        Err(DoseError::RegionOutOfBounds {
            label: RegionLabel::Center,
            ..
        })
    ));
}

#[test]
fn test_invalid_config_is_rejected_up_front() {
    let mut config = config();
    config.combine.dmax = None;
    assert!(matches!(
        DosePipeline::new(config, reference(), LateralCorrectionCurves::identity()),
        Err(DoseError::Configuration(_))
    ));
}
