//! Low-pass filters and heading smoothing

use nalgebra::Vector3;

use crate::math::{angular_difference, lerp_heading, normalize_angle};

/// Damping applied to the spring velocity each tick
const SPRING_DAMPING: f32 = 0.75;
/// Maximum heading change per tick in degrees
const MAX_SPRING_VELOCITY: f32 = 10.0;

/// Exponential smoothing filter for a scalar signal
///
/// `output = α·input + (1 − α)·previous`. The first sample seeds the filter
/// and passes through unchanged.
///
/// # Example
/// ```
/// use compass_fusion::LowPassFilter;
///
/// let mut filter = LowPassFilter::new(0.5);
/// assert_eq!(filter.filter(10.0), 10.0); // seeds
/// assert_eq!(filter.filter(20.0), 15.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LowPassFilter {
    alpha: f32,
    previous: Option<f32>,
}

impl LowPassFilter {
    /// Create a filter; `alpha` is clamped to `[0, 1]`
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: clamp_alpha(alpha),
            previous: None,
        }
    }

    pub fn filter(&mut self, value: f32) -> f32 {
        let filtered = match self.previous {
            Some(previous) => self.alpha * value + (1.0 - self.alpha) * previous,
            None => value,
        };
        self.previous = Some(filtered);
        filtered
    }

    /// Forget the filter state so the next sample seeds it again
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = clamp_alpha(alpha);
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Last filtered value, if any
    pub fn value(&self) -> Option<f32> {
        self.previous
    }
}

/// Per-axis low-pass filter for a 3D sensor vector
///
/// X, Y and Z are filtered independently with the same coefficient.
#[derive(Debug, Clone, Copy)]
pub struct Vector3Filter {
    x: LowPassFilter,
    y: LowPassFilter,
    z: LowPassFilter,
}

impl Vector3Filter {
    pub fn new(alpha: f32) -> Self {
        Self {
            x: LowPassFilter::new(alpha),
            y: LowPassFilter::new(alpha),
            z: LowPassFilter::new(alpha),
        }
    }

    pub fn filter(&mut self, vector: Vector3<f32>) -> Vector3<f32> {
        Vector3::new(
            self.x.filter(vector.x),
            self.y.filter(vector.y),
            self.z.filter(vector.z),
        )
    }

    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
        self.z.reset();
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.x.set_alpha(alpha);
        self.y.set_alpha(alpha);
        self.z.set_alpha(alpha);
    }
}

/// Heading smoothing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothingMode {
    /// Damped spring with bounded per-tick velocity
    #[default]
    Spring,
    /// Plain shortest-arc interpolation
    Lerp,
}

/// Heading smoother that never crosses the 0°/360° seam the long way
///
/// In [`SmoothingMode::Spring`] the displayed heading is pulled toward the
/// target by a spring whose stiffness is the filter coefficient, damped by
/// 0.75 per tick and limited to 10° per tick. In [`SmoothingMode::Lerp`] it
/// moves a fixed fraction of the shortest arc each tick.
#[derive(Debug, Clone, Copy)]
pub struct HeadingSmoother {
    alpha: f32,
    mode: SmoothingMode,
    current: Option<f32>,
    velocity: f32,
}

impl HeadingSmoother {
    pub fn new(alpha: f32, mode: SmoothingMode) -> Self {
        Self {
            alpha: clamp_alpha(alpha),
            mode,
            current: None,
            velocity: 0.0,
        }
    }

    /// Advance one tick toward `target` and return the smoothed heading
    pub fn update(&mut self, target: f32) -> f32 {
        let target = normalize_angle(target);

        let Some(current) = self.current else {
            self.current = Some(target);
            return target;
        };

        let next = match self.mode {
            SmoothingMode::Spring => {
                let spring_force = angular_difference(current, target) * self.alpha;
                self.velocity = (self.velocity * SPRING_DAMPING + spring_force)
                    .clamp(-MAX_SPRING_VELOCITY, MAX_SPRING_VELOCITY);
                normalize_angle(current + self.velocity)
            }
            SmoothingMode::Lerp => lerp_heading(current, target, self.alpha),
        };

        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.velocity = 0.0;
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = clamp_alpha(alpha);
    }

    /// Last smoothed heading, if any
    pub fn current(&self) -> Option<f32> {
        self.current
    }

    /// Current spring velocity in degrees per tick
    pub fn velocity(&self) -> f32 {
        self.velocity
    }
}

fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) }
}
