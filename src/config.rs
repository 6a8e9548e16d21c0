//! User-tunable compass configuration

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CompassError, Result};
use crate::math::normalize_angle;

/// Compass configuration
///
/// Created with defaults and mutated only through [`CompassConfig::merge`],
/// which validates a partial update before applying any of it.
///
/// # Example
/// ```
/// use compass_fusion::{CompassConfig, CompassConfigUpdate};
///
/// let mut config = CompassConfig::default();
/// config
///     .merge(CompassConfigUpdate {
///         low_pass_alpha: Some(0.3),
///         target_bearing: Some(Some(450.0)),
///         ..Default::default()
///     })
///     .unwrap();
///
/// assert_eq!(config.low_pass_alpha, 0.3);
/// assert_eq!(config.target_bearing, Some(90.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompassConfig {
    /// Sensor sampling frequency in Hz
    pub sensor_frequency: f32,
    /// Low-pass filter coefficient in `[0, 1]`, lower is smoother
    pub low_pass_alpha: f32,
    /// Display true north when declination is known
    pub show_true_north: bool,
    /// Vibrate when the heading reaches the locked bearing
    pub enable_haptics: bool,
    /// Locked target bearing in degrees
    pub target_bearing: Option<f32>,
    /// Degrees of tolerance for haptic feedback
    pub lock_tolerance: f32,
    /// Degrees of deviation before warning
    pub deviation_warning: f32,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            sensor_frequency: 50.0,
            low_pass_alpha: 0.15,
            show_true_north: true,
            enable_haptics: true,
            target_bearing: None,
            lock_tolerance: 1.0,
            deviation_warning: 5.0,
        }
    }
}

impl CompassConfig {
    /// Parse a full configuration; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        let mut validated = Self::default();
        validated.merge(CompassConfigUpdate::from(config))?;
        Ok(validated)
    }

    /// Validate and apply a partial update
    ///
    /// The update is all-or-nothing: if any field is invalid the
    /// configuration is left untouched.
    pub fn merge(&mut self, update: CompassConfigUpdate) -> Result<()> {
        update.validate()?;

        if let Some(frequency) = update.sensor_frequency {
            self.sensor_frequency = frequency;
        }
        if let Some(alpha) = update.low_pass_alpha {
            self.low_pass_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(show) = update.show_true_north {
            self.show_true_north = show;
        }
        if let Some(haptics) = update.enable_haptics {
            self.enable_haptics = haptics;
        }
        if let Some(bearing) = update.target_bearing {
            self.target_bearing = bearing.map(normalize_angle);
        }
        if let Some(tolerance) = update.lock_tolerance {
            self.lock_tolerance = tolerance;
        }
        if let Some(warning) = update.deviation_warning {
            self.deviation_warning = warning;
        }

        Ok(())
    }
}

/// Partial configuration update
///
/// Every field is optional; `None` leaves the current value alone.
/// `target_bearing` is doubly optional so an update can distinguish
/// "leave as is" (`None`) from "unlock" (`Some(None)`). In JSON, an absent
/// `targetBearing` key means the former and `null` the latter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompassConfigUpdate {
    pub sensor_frequency: Option<f32>,
    pub low_pass_alpha: Option<f32>,
    pub show_true_north: Option<bool>,
    pub enable_haptics: Option<bool>,
    #[serde(deserialize_with = "present_or_null")]
    pub target_bearing: Option<Option<f32>>,
    pub lock_tolerance: Option<f32>,
    pub deviation_warning: Option<f32>,
}

impl CompassConfigUpdate {
    /// Parse an update from JSON; unrecognized keys are ignored
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Update that only changes the locked bearing
    pub fn target_bearing(bearing: Option<f32>) -> Self {
        Self {
            target_bearing: Some(bearing),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(frequency) = self.sensor_frequency {
            if !frequency.is_finite() || frequency <= 0.0 {
                return Err(CompassError::invalid_config(
                    "sensorFrequency",
                    format!("{frequency} Hz is not a positive frequency"),
                ));
            }
        }
        if let Some(alpha) = self.low_pass_alpha {
            if !alpha.is_finite() {
                return Err(CompassError::invalid_config(
                    "lowPassAlpha",
                    "must be a finite number",
                ));
            }
        }
        if let Some(Some(bearing)) = self.target_bearing {
            if !bearing.is_finite() {
                return Err(CompassError::invalid_config(
                    "targetBearing",
                    "must be a finite number of degrees",
                ));
            }
        }
        check_threshold("lockTolerance", self.lock_tolerance)?;
        check_threshold("deviationWarning", self.deviation_warning)?;
        Ok(())
    }
}

impl From<CompassConfig> for CompassConfigUpdate {
    fn from(config: CompassConfig) -> Self {
        Self {
            sensor_frequency: Some(config.sensor_frequency),
            low_pass_alpha: Some(config.low_pass_alpha),
            show_true_north: Some(config.show_true_north),
            enable_haptics: Some(config.enable_haptics),
            target_bearing: Some(config.target_bearing),
            lock_tolerance: Some(config.lock_tolerance),
            deviation_warning: Some(config.deviation_warning),
        }
    }
}

fn check_threshold(field: &'static str, value: Option<f32>) -> Result<()> {
    match value {
        Some(degrees) if !degrees.is_finite() || degrees < 0.0 => Err(
            CompassError::invalid_config(field, format!("{degrees}° must be finite and >= 0")),
        ),
        _ => Ok(()),
    }
}

// A present key (even `null`) becomes `Some(..)`; absence is handled by `default`.
fn present_or_null<'de, D>(deserializer: D) -> core::result::Result<Option<Option<f32>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f32>::deserialize(deserializer).map(Some)
}
