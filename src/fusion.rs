//! Sensor fusion pipeline

use nalgebra::Vector3;

use crate::compass::{
    assess_confidence, calculate_field_strength, calculate_heading, calculate_heading_flat,
    calculate_tilt, compensate_tilt, detect_posture,
};
use crate::error::{CompassError, Result};
use crate::filter::{HeadingSmoother, SmoothingMode, Vector3Filter};
use crate::math::{Vector3Ext, normalize_angle};
use crate::types::{
    AccelerometerReading, Confidence, FusionOutput, MagneticReading, Posture, SensorKind,
    TiltAngles,
};

/// Pipeline settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionSettings {
    /// Low-pass coefficient shared by the vector filters and the smoother
    pub alpha: f32,
    pub smoothing: SmoothingMode,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            alpha: 0.15,
            smoothing: SmoothingMode::Spring,
        }
    }
}

/// Complete fusion pipeline
///
/// Filters raw magnetometer and accelerometer vectors per axis, corrects the
/// magnetic vector for device tilt, computes the heading and smooths it
/// across the 0°/360° seam. Only the most recent filtered vector of each
/// sensor is kept.
///
/// # Example
/// ```
/// use compass_fusion::{AccelerometerReading, MagneticReading, SensorFusion};
///
/// let mut fusion = SensorFusion::new();
/// fusion.set_real_magnetometer(true);
/// fusion.update_accelerometer(&AccelerometerReading::new(0.0, 0.0, 9.81, 0.0)).unwrap();
/// fusion.update_magnetic(&MagneticReading::new(0.0, 40.0, -20.0, 0.0)).unwrap();
///
/// let output = fusion.process().unwrap();
/// assert!(output.heading < 0.5 || output.heading > 359.5);
/// assert!(output.tilt_compensated);
/// ```
#[derive(Debug, Clone)]
pub struct SensorFusion {
    settings: FusionSettings,
    magnetic_filter: Vector3Filter,
    accelerometer_filter: Vector3Filter,
    smoother: HeadingSmoother,
    magnetic: Option<Vector3<f32>>,
    accelerometer: Option<Vector3<f32>>,
    real_magnetometer: bool,
}

impl SensorFusion {
    pub fn new() -> Self {
        Self::with_settings(FusionSettings::default())
    }

    pub fn with_settings(settings: FusionSettings) -> Self {
        Self {
            settings,
            magnetic_filter: Vector3Filter::new(settings.alpha),
            accelerometer_filter: Vector3Filter::new(settings.alpha),
            smoother: HeadingSmoother::new(settings.alpha, settings.smoothing),
            magnetic: None,
            accelerometer: None,
            real_magnetometer: false,
        }
    }

    /// Feed a magnetometer sample
    ///
    /// A sample with a non-finite component is rejected and the last good
    /// filtered value is kept.
    pub fn update_magnetic(&mut self, reading: &MagneticReading) -> Result<()> {
        check_finite(SensorKind::Magnetometer, &reading.vector)?;
        self.magnetic = Some(self.magnetic_filter.filter(reading.vector));
        Ok(())
    }

    /// Feed an accelerometer sample
    pub fn update_accelerometer(&mut self, reading: &AccelerometerReading) -> Result<()> {
        check_finite(SensorKind::Accelerometer, &reading.vector)?;
        self.accelerometer = Some(self.accelerometer_filter.filter(reading.vector));
        Ok(())
    }

    /// Declare whether magnetic samples come from a physical magnetometer
    ///
    /// Synthesized vectors have a constant magnitude, so field strength and
    /// confidence are only meaningful with a real sensor.
    pub fn set_real_magnetometer(&mut self, real: bool) {
        self.real_magnetometer = real;
    }

    pub fn has_real_magnetometer(&self) -> bool {
        self.real_magnetometer
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.settings.alpha = alpha;
        self.magnetic_filter.set_alpha(alpha);
        self.accelerometer_filter.set_alpha(alpha);
        self.smoother.set_alpha(alpha);
    }

    pub fn settings(&self) -> FusionSettings {
        self.settings
    }

    /// Clear every filter and drop the latest samples
    pub fn reset(&mut self) {
        self.magnetic_filter.reset();
        self.accelerometer_filter.reset();
        self.smoother.reset();
        self.magnetic = None;
        self.accelerometer = None;
    }

    /// Run one pipeline pass over the latest filtered samples
    ///
    /// # Returns
    /// `None` until a magnetic sample has been received
    pub fn process(&mut self) -> Option<FusionOutput> {
        let magnetic = self.magnetic?;

        let gravity = self
            .accelerometer
            .filter(|accelerometer| accelerometer.safe_normalize() != Vector3::zeros());

        let (raw_heading, tilt, posture, tilt_compensated) = match gravity {
            Some(accelerometer) => {
                let tilt = calculate_tilt(accelerometer);
                let horizontal = compensate_tilt(magnetic, &tilt);
                (
                    calculate_heading(horizontal.x, horizontal.y),
                    tilt,
                    detect_posture(accelerometer),
                    true,
                )
            }
            None => (
                calculate_heading_flat(magnetic),
                TiltAngles::default(),
                Posture::Flat,
                false,
            ),
        };

        let heading = normalize_angle(self.smoother.update(raw_heading));

        let (field_strength, confidence) = if self.real_magnetometer {
            let strength = calculate_field_strength(magnetic);
            (Some(strength), assess_confidence(strength))
        } else {
            (None, Confidence::Medium)
        };

        Some(FusionOutput {
            heading,
            field_strength,
            confidence,
            tilt,
            tilt_compensated,
            posture,
        })
    }
}

impl Default for SensorFusion {
    fn default() -> Self {
        Self::new()
    }
}

fn check_finite(sensor: SensorKind, vector: &Vector3<f32>) -> Result<()> {
    if vector.all_finite() {
        Ok(())
    } else {
        Err(CompassError::SensorRead {
            sensor,
            reason: "non-finite component".into(),
        })
    }
}
