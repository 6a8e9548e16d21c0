//! Error types for the compass core

use crate::types::SensorKind;

/// Result type alias using [`CompassError`]
pub type Result<T> = core::result::Result<T, CompassError>;

/// Errors surfaced by the compass core
///
/// Errors fall into two groups. Fatal errors stop the compass from working
/// at all and return the state machine to `Idle`. Soft errors disable a
/// single feature (true north, wake lock, one bad sample) and are absorbed
/// where they occur. Use [`CompassError::is_fatal`] to tell them apart.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompassError {
    #[error("No compass sensors available on this device")]
    NoSensorsAvailable,

    #[error("Sensor permission denied. Please allow access to device orientation.")]
    PermissionDenied,

    #[error("Failed to start {sensor}: {reason}")]
    SensorUnavailable { sensor: SensorKind, reason: String },

    #[error("{sensor} read error: {reason}")]
    SensorRead { sensor: SensorKind, reason: String },

    #[error("Geolocation unavailable: {0}")]
    GeolocationUnavailable(String),

    #[error("Screen wake lock not supported on this device")]
    WakeLockUnsupported,

    #[error("Failed to toggle screen wake lock: {0}")]
    WakeLockFailed(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Compass driver has stopped")]
    DriverStopped,
}

impl CompassError {
    /// Whether the error prevents the compass from functioning at all
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoSensorsAvailable | Self::PermissionDenied | Self::SensorUnavailable { .. }
        )
    }

    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CompassError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
