//! Sampled invariants of the pure compass math

use chrono::{TimeZone, Utc};
use compass_fusion::compass::{calculate_heading_flat, calculate_tilt, field_strength};
use compass_fusion::declination::{calculate_declination, estimate_accuracy};
use compass_fusion::orchestrator::lock_status;
use compass_fusion::{
    AccelerometerReading, CompassConfig, Confidence, HeadingSmoother, MagneticReading,
    SensorFusion, SmoothingMode, angular_difference, assess_confidence, lerp_heading,
    magnetic_to_true, normalize_angle, true_to_magnetic,
};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SAMPLES: usize = 2_000;

fn rng() -> StdRng {
    StdRng::seed_from_u64(0x00C0_FFEE)
}

#[test]
fn test_normalize_angle_range() {
    let mut rng = rng();
    for _ in 0..SAMPLES {
        let angle: f32 = rng.random_range(-10_000.0..10_000.0);
        let normalized = normalize_angle(angle);
        assert!((0.0..360.0).contains(&normalized), "{angle} -> {normalized}");
    }
}

#[test]
fn test_angular_difference_is_shortest_arc() {
    let mut rng = rng();
    for _ in 0..SAMPLES {
        let from: f32 = rng.random_range(0.0..360.0);
        let to: f32 = rng.random_range(0.0..360.0);
        let diff = angular_difference(from, to);
        assert!((-180.0..=180.0).contains(&diff));
        // Stepping by the difference lands on the target
        assert!(angular_difference(normalize_angle(from + diff), to).abs() < 1e-3);
        // Antisymmetric except for the sign ambiguity at half a turn
        if diff.abs() != 180.0 {
            assert_eq!(diff, -angular_difference(to, from), "{from} -> {to}");
        }
    }
}

#[test]
fn test_lerp_heading_stays_on_short_arc() {
    let mut rng = rng();
    for _ in 0..SAMPLES {
        let from: f32 = rng.random_range(0.0..360.0);
        let to: f32 = rng.random_range(0.0..360.0);
        let t: f32 = rng.random_range(0.0..=1.0);
        let mid = lerp_heading(from, to, t);
        let span = angular_difference(from, to).abs();
        assert!(angular_difference(from, mid).abs() <= span + 1e-3);
        assert!(angular_difference(mid, to).abs() <= span + 1e-3);
    }
}

#[test]
fn test_confidence_bands() {
    let mut rng = rng();
    for _ in 0..SAMPLES {
        let strength: f32 = rng.random_range(0.0..200.0);
        let expected = if (field_strength::NORMAL_MIN..=field_strength::NORMAL_MAX).contains(&strength) {
            Confidence::High
        } else if (field_strength::WARNING_LOW..=field_strength::WARNING_HIGH).contains(&strength) {
            Confidence::Medium
        } else {
            Confidence::Low
        };
        assert_eq!(assess_confidence(strength), expected, "strength {strength}");
    }

    assert_eq!(assess_confidence(25.0), Confidence::High);
    assert_eq!(assess_confidence(65.0), Confidence::High);
    assert_eq!(assess_confidence(20.0), Confidence::Medium);
    assert_eq!(assess_confidence(80.0), Confidence::Medium);
    assert_eq!(assess_confidence(19.9), Confidence::Low);
    assert_eq!(assess_confidence(80.1), Confidence::Low);
}

#[test]
fn test_flat_heading_follows_field_direction() {
    let mut rng = rng();
    for _ in 0..SAMPLES {
        let bearing: f32 = rng.random_range(0.0..360.0);
        let strength: f32 = rng.random_range(20.0..70.0);
        let rad = bearing.to_radians();
        // Field pointing toward the bearing, clockwise from +Y
        let field = Vector3::new(rad.sin() * strength, rad.cos() * strength, -20.0);
        let heading = calculate_heading_flat(field);
        assert!(
            angular_difference(heading, bearing).abs() < 0.05,
            "bearing {bearing} -> {heading}"
        );
    }
}

#[test]
fn test_flat_device_has_no_tilt() {
    let mut rng = rng();
    for _ in 0..200 {
        let g: f32 = rng.random_range(1.0..20.0);
        let tilt = calculate_tilt(Vector3::new(0.0, 0.0, g));
        assert!(tilt.pitch.abs() < 1e-4);
        assert!(tilt.roll.abs() < 1e-4);
        assert!(tilt.tilt.abs() < 1e-3);
    }
}

#[test]
fn test_fusion_heading_always_normalized() {
    let mut rng = rng();
    let mut fusion = SensorFusion::new();
    fusion.set_real_magnetometer(true);

    for i in 0..SAMPLES {
        let t = i as f64 * 20.0;
        let accel = AccelerometerReading::new(
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
            rng.random_range(7.0..10.0),
            t,
        );
        let mag = MagneticReading::new(
            rng.random_range(-60.0..60.0),
            rng.random_range(-60.0..60.0),
            rng.random_range(-60.0..60.0),
            t,
        );
        fusion.update_accelerometer(&accel).unwrap();
        fusion.update_magnetic(&mag).unwrap();

        let output = fusion.process().unwrap();
        assert!((0.0..360.0).contains(&output.heading));
        assert!(output.field_strength.unwrap() >= 0.0);
        assert!(output.tilt_compensated);
    }
}

#[test]
fn test_smoother_converges_in_both_modes() {
    let mut rng = rng();
    for mode in [SmoothingMode::Spring, SmoothingMode::Lerp] {
        for _ in 0..100 {
            let start: f32 = rng.random_range(0.0..360.0);
            let target: f32 = rng.random_range(0.0..360.0);
            let mut smoother = HeadingSmoother::new(0.15, mode);
            smoother.update(start);

            let mut heading = start;
            for _ in 0..400 {
                heading = smoother.update(target);
            }
            assert!(
                angular_difference(heading, target).abs() < 0.5,
                "{mode:?}: {start} -> {target} settled at {heading}"
            );
        }
    }
}

#[test]
fn test_declination_round_trip() {
    let mut rng = rng();
    for _ in 0..SAMPLES {
        let heading: f32 = rng.random_range(0.0..360.0);
        let declination: f32 = rng.random_range(-30.0..30.0);
        let back = true_to_magnetic(magnetic_to_true(heading, declination), declination);
        assert!(angular_difference(back, heading).abs() < 1e-3);
    }
}

#[test]
fn test_declination_model_is_bounded() {
    let mut rng = rng();
    let date = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    for _ in 0..SAMPLES {
        let latitude: f64 = rng.random_range(-89.0..89.0);
        let longitude: f64 = rng.random_range(-180.0..180.0);
        let declination = calculate_declination(latitude, longitude, 0.0, date);
        assert!(declination.is_finite());
        // Secular drift may push the antipode of the pole slightly past 180
        assert!(declination.abs() <= 181.0);

        let accuracy = estimate_accuracy(latitude, rng.random_range(0.0..1e6));
        assert!((1.5..=10.0).contains(&accuracy));
    }
}

#[test]
fn test_lock_status_thresholds() {
    let config = CompassConfig::default();
    let mut rng = rng();
    for _ in 0..SAMPLES {
        let target: f32 = rng.random_range(0.0..360.0);
        let heading: f32 = rng.random_range(0.0..360.0);
        let status = lock_status(heading, target, &config);

        assert!((0.0..=180.0).contains(&status.deviation));
        assert_eq!(status.on_target, status.deviation <= config.lock_tolerance);
        assert_eq!(status.warning, status.deviation > config.deviation_warning);
        assert!(!(status.on_target && status.warning));
    }

    // Across north
    let status = lock_status(359.5, 0.0, &config);
    assert!(status.on_target);
    assert!((status.deviation - 0.5).abs() < 1e-4);
}
