//! Tests for strip sampling and the full calibration stage

use super::*;
use crate::error::DoseError;
use crate::models::intensity_to_density;

const PITCH_MM: f64 = 1.0;

/// Generating models: default prior rates with amplitudes away from the
/// prior starting point.
fn truth() -> CalibrationTable {
    let priors = ModelPriors::default();
    let model = |c: Channel, base: f64, phi_r: f64, phi_b: f64| {
        TwoPhaseModel::from_priors(base, priors.channel(c)).with_amplitudes(phi_r, phi_b)
    };
    CalibrationTable::new(
        model(Channel::Red, 0.12, 0.30, 0.55),
        model(Channel::Green, 0.09, 0.22, 0.35),
        model(Channel::Blue, 0.30, 0.12, 0.20),
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

/// Vertical 10x150 strip whose row `i` received `depth_dose(i * pitch)`.
fn synthetic_strip(table: &CalibrationTable) -> ScannedImage {
    let (width, height) = (10u32, 150u32);
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        let densities = table.densities(depth_dose(y as f64 * PITCH_MM / 10.0));
        for _ in 0..width {
            for d in densities {
                data.push((65535.0 * 10f64.powf(-d)).round() as u16);
            }
        }
    }
    ScannedImage::new(width, height, data, 65535).unwrap()
}

fn base_of(table: &CalibrationTable) -> BaseDensities {
    [
        table[Channel::Red].base,
        table[Channel::Green].base,
        table[Channel::Blue].base,
    ]
}

/// Profile with density equal to position (cm) in every channel.
fn linear_profile(len: usize) -> DensityProfile {
    let positions_cm: Vec<f64> = (0..len).map(|i| i as f64 * 0.1).collect();
    let densities = positions_cm.iter().map(|&p| [p, p, p]).collect();
    DensityProfile {
        positions_cm,
        densities,
    }
}

// ========================================================================
// Sampling
// ========================================================================

#[test]
fn test_depth_window_is_exclusive() {
    let reference =
        ReferenceTable::new(vec![(0.5, 3.0), (1.0, 2.9), (2.0, 2.5), (3.0, 2.0)]).unwrap();
    let config = CalibrationConfig {
        depth_min_cm: 0.5,
        depth_max_cm: 3.0,
        ..Default::default()
    };
    let samples = sample_calibration(&linear_profile(50), &reference, &config).unwrap();
    let depths: Vec<f64> = samples.iter().map(|s| s.depth_cm).collect();
    assert_eq!(depths, vec![1.0, 2.0]);
}

#[test]
fn test_axial_shift_moves_sampling_position() {
    let reference = ReferenceTable::new(vec![(1.0, 2.0), (2.0, 1.5)]).unwrap();
    let config = CalibrationConfig {
        depth_min_cm: 0.0,
        depth_max_cm: 10.0,
        axial_shift_cm: 0.75,
        ..Default::default()
    };
    let samples = sample_calibration(&linear_profile(50), &reference, &config).unwrap();
    assert_eq!(samples.len(), 2);
    for s in &samples {
        assert_eq!(s.strip_position_cm, s.depth_cm + 0.75);
        assert!((s.densities[0] - s.strip_position_cm).abs() < 1e-12);
    }
    assert_eq!(samples[0].reference_dose, 2.0);
}

#[test]
fn test_positions_past_strip_end_are_skipped() {
    // profile covers 0.0..=1.9 cm
    let reference = ReferenceTable::new(vec![(1.0, 2.0), (1.5, 1.8), (2.5, 1.2)]).unwrap();
    let config = CalibrationConfig {
        depth_min_cm: 0.0,
        depth_max_cm: 10.0,
        axial_shift_cm: 0.5,
        ..Default::default()
    };
    let samples = sample_calibration(&linear_profile(20), &reference, &config).unwrap();
    let depths: Vec<f64> = samples.iter().map(|s| s.depth_cm).collect();
    assert_eq!(depths, vec![1.0]);
}

// ========================================================================
// Full calibration
// ========================================================================

#[test]
fn test_synthetic_strip_recovers_amplitudes() {
    let truth = truth();
    let strip = synthetic_strip(&truth);
    let calibration = calibrate(
        &strip,
        &reference(),
        &base_of(&truth),
        &ModelPriors::default(),
        &CalibrationConfig::default(),
        PITCH_MM,
    )
    .unwrap();

    assert_eq!(calibration.fits.len(), 3);
    assert_eq!(calibration.pixel_pitch_mm, PITCH_MM);
    // 0.25 cm steps strictly inside (0.5, 14.0)
    assert_eq!(calibration.samples.len(), 53);
    for channel in Channel::ALL {
        let fitted = calibration.table[channel];
        let expected = truth[channel];
        assert!(fitted.phi_r >= 0.0 && fitted.phi_b >= 0.0);
        assert!(
            (fitted.phi_r - expected.phi_r).abs() < 1e-3,
            "{} phi_r {} vs {}",
            channel,
            fitted.phi_r,
            expected.phi_r
        );
        assert!((fitted.phi_b - expected.phi_b).abs() < 1e-3);
        assert_eq!(fitted.k_r, expected.k_r);
        assert_eq!(fitted.base, expected.base);
    }
}

#[test]
fn test_seeds_span_headroom_over_max_sampled_dose() {
    let truth = truth();
    let calibration = calibrate(
        &synthetic_strip(&truth),
        &reference(),
        &base_of(&truth),
        &ModelPriors::default(),
        &CalibrationConfig::default(),
        PITCH_MM,
    )
    .unwrap();

    let max_sampled = calibration
        .samples
        .iter()
        .map(|s| s.reference_dose)
        .fold(0.0, f64::max);
    assert_eq!(calibration.seed_doses.len(), 8);
    assert_eq!(calibration.seed_doses[0], 0.0);
    assert!((calibration.seed_doses[7] - 1.2 * max_sampled).abs() < 1e-12);
}

#[test]
fn test_explicit_seed_doses_override() {
    let truth = truth();
    let config = CalibrationConfig {
        seed_doses: Some(vec![0.0, 1.0, 2.0, 4.0, 8.0, 12.0]),
        ..Default::default()
    };
    let calibration = calibrate(
        &synthetic_strip(&truth),
        &reference(),
        &base_of(&truth),
        &ModelPriors::default(),
        &config,
        PITCH_MM,
    )
    .unwrap();
    assert_eq!(calibration.seed_doses, vec![0.0, 1.0, 2.0, 4.0, 8.0, 12.0]);
}

#[test]
fn test_rational_seed_is_close_to_true_dose() {
    let truth = truth();
    let calibration = calibrate(
        &synthetic_strip(&truth),
        &reference(),
        &base_of(&truth),
        &ModelPriors::default(),
        &CalibrationConfig::default(),
        PITCH_MM,
    )
    .unwrap();
    for channel in Channel::ALL {
        let density = calibration.table[channel].density(5.0);
        let estimate = calibration.rational[channel].dose(density);
        assert!((estimate - 5.0).abs() < 0.5, "{}: {}", channel, estimate);
    }
}

#[test]
fn test_empty_window_fails_the_fit() {
    let truth = truth();
    let config = CalibrationConfig {
        depth_min_cm: 20.0,
        depth_max_cm: 30.0,
        ..Default::default()
    };
    let result = calibrate(
        &synthetic_strip(&truth),
        &reference(),
        &base_of(&truth),
        &ModelPriors::default(),
        &config,
        PITCH_MM,
    );
    assert!(matches!(
        result,
        Err(DoseError::CalibrationFit {
            channel: Channel::Red,
            ..
        })
    ));
}

#[test]
fn test_calibration_validates_against_its_own_reference() {
    let truth = truth();
    let calibration = calibrate(
        &synthetic_strip(&truth),
        &reference(),
        &base_of(&truth),
        &ModelPriors::default(),
        &CalibrationConfig::default(),
        PITCH_MM,
    )
    .unwrap();
    let report = validate_calibration(
        &calibration,
        [0.5, 0.35, 0.15],
        crate::combine::CombineMode::Weighted,
        12.0,
        &crate::inversion::SolverSettings::default(),
    );
    assert_eq!(report.points.len(), calibration.samples.len());
    assert_eq!(report.fraction_within, 1.0);
    assert!(report.max_abs_relative < 0.01);
}

#[test]
fn test_quantized_density_matches_scan_conversion() {
    let truth = truth();
    let strip = synthetic_strip(&truth);
    let px = strip.pixel(0, 0);
    let expected = intensity_to_density(px[0] as f64, 65535.0);
    let profile = density_profile(&strip, 20, PITCH_MM).unwrap();
    assert_eq!(profile.densities[0][0], expected);
    assert_eq!(profile.positions_cm.len(), 150);
}
