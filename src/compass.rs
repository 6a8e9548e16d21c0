//! Tilt-compensated heading and field-strength assessment

use nalgebra::{Vector2, Vector3};

use crate::math::{RAD_TO_DEG, Vector3Ext, normalize_angle};
use crate::types::{Confidence, Posture, TiltAngles};

/// Magnetic field strength thresholds in µT
pub mod field_strength {
    /// Lower bound of Earth's normal field
    pub const NORMAL_MIN: f32 = 25.0;
    /// Upper bound of Earth's normal field
    pub const NORMAL_MAX: f32 = 65.0;
    pub const WARNING_LOW: f32 = 20.0;
    pub const WARNING_HIGH: f32 = 80.0;
    pub const INTERFERENCE_LOW: f32 = 15.0;
    pub const INTERFERENCE_HIGH: f32 = 100.0;
}

/// Tilt beyond which the device should be levelled for accurate readings
pub const TILT_THRESHOLD_DEGREES: f32 = 15.0;

/// Tilt at which the device no longer counts as lying flat
const UPRIGHT_TILT_DEGREES: f32 = 45.0;

const CARDINAL_LABELS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Extract pitch, roll and total tilt from an accelerometer vector
///
/// The vector is normalized first; pitch is the front-to-back tilt,
/// roll the left-to-right tilt and `tilt` the angle from vertical derived
/// from the normalized Z component. A zero or non-finite vector yields all
/// zeros instead of NaN.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_fusion::compass::calculate_tilt;
///
/// let flat = calculate_tilt(Vector3::new(0.0, 0.0, 9.81));
/// assert!(flat.pitch.abs() < 1e-4);
/// assert!(flat.roll.abs() < 1e-4);
/// assert!(flat.tilt.abs() < 1e-4);
/// ```
pub fn calculate_tilt(accelerometer: Vector3<f32>) -> TiltAngles {
    let gravity = accelerometer.safe_normalize();
    if gravity == Vector3::zeros() {
        return TiltAngles::default();
    }

    let pitch = (-gravity.x).atan2((gravity.y * gravity.y + gravity.z * gravity.z).sqrt());
    let roll = gravity.y.atan2(gravity.z);
    let tilt = gravity.z.abs().min(1.0).acos();

    TiltAngles {
        pitch: pitch * RAD_TO_DEG,
        roll: roll * RAD_TO_DEG,
        tilt: tilt * RAD_TO_DEG,
    }
}

/// Rotate a magnetic vector into the horizontal plane
///
/// Returns the horizontal components `(Hx, Hy)` using the standard
/// compensated-compass rotation for the given pitch and roll.
pub fn compensate_tilt(magnetic: Vector3<f32>, tilt: &TiltAngles) -> Vector2<f32> {
    let (sin_pitch, cos_pitch) = tilt.pitch.to_radians().sin_cos();
    let (sin_roll, cos_roll) = tilt.roll.to_radians().sin_cos();

    let hx = magnetic.x * cos_pitch + magnetic.y * sin_roll * sin_pitch
        - magnetic.z * cos_roll * sin_pitch;
    let hy = magnetic.y * cos_roll + magnetic.z * sin_roll;

    Vector2::new(hx, hy)
}

/// Compass heading from horizontal magnetic components
///
/// Converts from the math convention (counter-clockwise from +X) to the
/// compass convention (clockwise from north).
///
/// # Returns
/// Heading in degrees, `[0, 360)`
///
/// # Example
/// ```
/// use compass_fusion::compass::calculate_heading;
///
/// let east = calculate_heading(1.0, 0.0);
/// assert!((east - 90.0).abs() < 1e-4);
/// ```
pub fn calculate_heading(hx: f32, hy: f32) -> f32 {
    normalize_angle(90.0 - hy.atan2(hx) * RAD_TO_DEG)
}

/// Heading from raw magnetometer X/Y, assuming the device is flat
///
/// Used when no accelerometer is available; accuracy degrades with tilt.
pub fn calculate_heading_flat(magnetic: Vector3<f32>) -> f32 {
    calculate_heading(magnetic.x, magnetic.y)
}

/// Magnitude of the magnetic field vector in µT
pub fn calculate_field_strength(magnetic: Vector3<f32>) -> f32 {
    magnetic.magnitude()
}

/// Classify heading reliability from field strength
///
/// - `High`: within Earth's normal range, 25–65 µT
/// - `Medium`: within the warning band, 20–80 µT
/// - `Low`: anything else
pub fn assess_confidence(strength: f32) -> Confidence {
    use field_strength::*;

    if (NORMAL_MIN..=NORMAL_MAX).contains(&strength) {
        Confidence::High
    } else if (WARNING_LOW..=WARNING_HIGH).contains(&strength) {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Whether the field strength indicates magnetic interference
pub fn has_interference(strength: f32) -> bool {
    use field_strength::*;

    !(INTERFERENCE_LOW..=INTERFERENCE_HIGH).contains(&strength)
}

/// Classify how the device is held from its gravity vector
pub fn detect_posture(accelerometer: Vector3<f32>) -> Posture {
    let gravity = accelerometer.safe_normalize();
    if gravity == Vector3::zeros() {
        return Posture::Flat;
    }

    let tilt = gravity.z.abs().min(1.0).acos() * RAD_TO_DEG;
    if tilt < UPRIGHT_TILT_DEGREES {
        Posture::Flat
    } else if gravity.y.abs() >= gravity.x.abs() {
        Posture::UprightPortrait
    } else {
        Posture::UprightLandscape
    }
}

/// Eight-point cardinal label for a heading
///
/// # Example
/// ```
/// use compass_fusion::compass::cardinal_direction;
///
/// assert_eq!(cardinal_direction(0.0), "N");
/// assert_eq!(cardinal_direction(350.0), "N");
/// assert_eq!(cardinal_direction(100.0), "E");
/// ```
pub fn cardinal_direction(heading: f32) -> &'static str {
    let sector = ((normalize_angle(heading) + 22.5) / 45.0) as usize % CARDINAL_LABELS.len();
    CARDINAL_LABELS[sector]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::angular_difference;

    const GRAVITY: f32 = 9.81;

    fn assert_heading(actual: f32, expected: f32) {
        assert!(
            angular_difference(actual, expected).abs() < 0.5,
            "heading should be ~{expected}°, got {actual}°"
        );
    }

    #[test]
    fn test_flat_device_has_no_tilt() {
        let tilt = calculate_tilt(Vector3::new(0.0, 0.0, GRAVITY));
        assert!(tilt.pitch.abs() < 1e-4);
        assert!(tilt.roll.abs() < 1e-4);
        assert!(tilt.tilt.abs() < 1e-3);
    }

    #[test]
    fn test_tilt_axes() {
        // Nose down 30°: gravity leans onto -X
        let s = 30f32.to_radians().sin();
        let c = 30f32.to_radians().cos();
        let pitched = calculate_tilt(Vector3::new(-s, 0.0, c) * GRAVITY);
        assert!((pitched.pitch - 30.0).abs() < 0.01, "pitch {}", pitched.pitch);
        assert!(pitched.roll.abs() < 0.01);
        assert!((pitched.tilt - 30.0).abs() < 0.01);

        let rolled = calculate_tilt(Vector3::new(0.0, s, c) * GRAVITY);
        assert!((rolled.roll - 30.0).abs() < 0.01, "roll {}", rolled.roll);
        assert!(rolled.pitch.abs() < 0.01);
        assert!((rolled.tilt - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_accelerometer_does_not_produce_nan() {
        let tilt = calculate_tilt(Vector3::zeros());
        assert_eq!(tilt, TiltAngles::default());

        let tilt = calculate_tilt(Vector3::new(f32::NAN, 0.0, 1.0));
        assert_eq!(tilt, TiltAngles::default());
    }

    #[test]
    fn test_heading_cardinal_directions() {
        // Field along +Y reads north, +X east
        assert_heading(calculate_heading(0.0, 1.0), 0.0);
        assert_heading(calculate_heading(1.0, 0.0), 90.0);
        assert_heading(calculate_heading(0.0, -1.0), 180.0);
        assert_heading(calculate_heading(-1.0, 0.0), 270.0);
    }

    #[test]
    fn test_heading_range() {
        for angle_deg in (0..360).step_by(15) {
            let angle = (angle_deg as f32).to_radians();
            let heading = calculate_heading(angle.cos(), angle.sin());
            assert!(
                (0.0..360.0).contains(&heading),
                "heading {heading} out of range for {angle_deg}°"
            );
        }
        // Degenerate horizontal field still yields a finite heading
        assert!(calculate_heading(0.0, 0.0).is_finite());
    }

    #[test]
    fn test_flat_compensation_is_identity() {
        let magnetic = Vector3::new(12.0, 30.0, -28.0);
        let horizontal = compensate_tilt(magnetic, &TiltAngles::default());
        assert!((horizontal.x - 12.0).abs() < 1e-5);
        assert!((horizontal.y - 30.0).abs() < 1e-5);
        assert_heading(
            calculate_heading(horizontal.x, horizontal.y),
            calculate_heading_flat(magnetic),
        );
    }

    #[test]
    fn test_compensation_uses_vertical_component_when_rolled() {
        // With roll the Z component feeds into Hy
        let tilt = TiltAngles {
            pitch: 0.0,
            roll: 90.0,
            tilt: 90.0,
        };
        let horizontal = compensate_tilt(Vector3::new(0.0, 0.0, 20.0), &tilt);
        assert!(horizontal.x.abs() < 1e-4);
        assert!((horizontal.y - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_field_strength() {
        let strength = calculate_field_strength(Vector3::new(20.0, 20.0, 10.0));
        assert!((strength - 30.0).abs() < 1e-5);
    }

    #[test]
    fn test_confidence_boundaries() {
        assert_eq!(assess_confidence(40.0), Confidence::High);
        assert_eq!(assess_confidence(25.0), Confidence::High);
        assert_eq!(assess_confidence(65.0), Confidence::High);
        assert_eq!(assess_confidence(24.9), Confidence::Medium);
        assert_eq!(assess_confidence(20.0), Confidence::Medium);
        assert_eq!(assess_confidence(80.0), Confidence::Medium);
        assert_eq!(assess_confidence(19.9), Confidence::Low);
        assert_eq!(assess_confidence(10.0), Confidence::Low);
        assert_eq!(assess_confidence(150.0), Confidence::Low);
        assert_eq!(assess_confidence(f32::NAN), Confidence::Low);
    }

    #[test]
    fn test_interference() {
        assert!(!has_interference(45.0));
        assert!(!has_interference(15.0));
        assert!(!has_interference(100.0));
        assert!(has_interference(14.9));
        assert!(has_interference(150.0));
    }

    #[test]
    fn test_posture() {
        assert_eq!(detect_posture(Vector3::new(0.0, 0.0, GRAVITY)), Posture::Flat);
        assert_eq!(detect_posture(Vector3::new(0.0, 0.0, -GRAVITY)), Posture::Flat);
        assert_eq!(
            detect_posture(Vector3::new(0.0, GRAVITY, 1.0)),
            Posture::UprightPortrait
        );
        assert_eq!(
            detect_posture(Vector3::new(GRAVITY, 0.5, 1.0)),
            Posture::UprightLandscape
        );
        assert_eq!(detect_posture(Vector3::zeros()), Posture::Flat);
    }

    #[test]
    fn test_cardinal_labels() {
        assert_eq!(cardinal_direction(22.4), "N");
        assert_eq!(cardinal_direction(22.5), "NE");
        assert_eq!(cardinal_direction(90.0), "E");
        assert_eq!(cardinal_direction(180.0), "S");
        assert_eq!(cardinal_direction(247.5), "W");
        assert_eq!(cardinal_direction(337.5), "N");
        assert_eq!(cardinal_direction(-45.0), "NW");
    }
}
