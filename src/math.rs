//! Angle helpers and nalgebra extensions

use nalgebra::Vector3;

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Normalize an angle to `[0, 360)`
///
/// Non-finite input maps to `0.0` so a bad sample can never leak NaN into a
/// published heading.
///
/// # Example
/// ```
/// use compass_fusion::normalize_angle;
///
/// assert_eq!(normalize_angle(-90.0), 270.0);
/// assert_eq!(normalize_angle(720.0), 0.0);
/// ```
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }

    let normalized = angle.rem_euclid(360.0);

    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Shortest signed angular difference from `from` to `to`
///
/// Result lies in `[-180, 180]`; positive values are clockwise.
///
/// # Example
/// ```
/// use compass_fusion::angular_difference;
///
/// assert_eq!(angular_difference(350.0, 10.0), 20.0);
/// assert_eq!(angular_difference(10.0, 350.0), -20.0);
/// ```
pub fn angular_difference(from: f32, to: f32) -> f32 {
    let mut diff = normalize_angle(to) - normalize_angle(from);
    if diff > 180.0 {
        diff -= 360.0;
    } else if diff < -180.0 {
        diff += 360.0;
    }
    diff
}

/// Interpolate between two headings along the shortest arc
///
/// `factor` of `0.0` keeps `current`, `1.0` lands on `target`.
pub fn lerp_heading(current: f32, target: f32, factor: f32) -> f32 {
    let diff = angular_difference(current, target);
    normalize_angle(current + diff * factor)
}

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f32>;

    /// Whether every component is finite
    fn all_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f32> {
    fn safe_normalize(&self) -> Vector3<f32> {
        let mag = self.magnitude();
        if mag > 0.0 && mag.is_finite() {
            *self / mag
        } else {
            Vector3::zeros()
        }
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|component| component.is_finite())
    }
}
