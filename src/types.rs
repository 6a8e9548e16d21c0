//! Core types shared across the compass library

use chrono::{DateTime, Utc};
use core::fmt;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Magnetometer sample
///
/// One raw magnetic field vector in microteslas (µT) together with the
/// capture timestamp in milliseconds. Readings are immutable and superseded
/// by the next callback; no history is retained.
///
/// # Example
/// ```
/// use compass_fusion::MagneticReading;
///
/// let reading = MagneticReading::new(12.0, 30.0, -28.0, 1_000.0);
/// assert_eq!(reading.vector.y, 30.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticReading {
    /// Field vector in µT
    pub vector: Vector3<f32>,
    /// Capture time in milliseconds
    pub timestamp: f64,
}

impl MagneticReading {
    pub fn new(x: f32, y: f32, z: f32, timestamp: f64) -> Self {
        Self {
            vector: Vector3::new(x, y, z),
            timestamp,
        }
    }
}

/// Accelerometer sample
///
/// One raw acceleration vector in m/s² (gravity included) with the capture
/// timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerometerReading {
    /// Acceleration vector in m/s²
    pub vector: Vector3<f32>,
    /// Capture time in milliseconds
    pub timestamp: f64,
}

impl AccelerometerReading {
    pub fn new(x: f32, y: f32, z: f32, timestamp: f64) -> Self {
        Self {
            vector: Vector3::new(x, y, z),
            timestamp,
        }
    }
}

/// Fused orientation sample
///
/// Mirrors an orientation event: `alpha` is rotation about Z (compass-like
/// heading, counter-clockwise), `beta` the front-to-back tilt and `gamma` the
/// left-to-right tilt, all in degrees. Some platforms add a vendor compass
/// heading (clockwise from north) and its accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationReading {
    pub alpha: Option<f32>,
    pub beta: Option<f32>,
    pub gamma: Option<f32>,
    /// Whether `alpha` is referenced to the Earth frame
    pub absolute: bool,
    /// Vendor-proprietary compass heading in degrees
    pub compass_heading: Option<f32>,
    /// Vendor-proprietary heading accuracy in degrees
    pub compass_accuracy: Option<f32>,
    /// Capture time in milliseconds
    pub timestamp: f64,
}

/// Physical or virtual sensor a reading or error originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Magnetometer,
    Accelerometer,
    Orientation,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Magnetometer => "magnetometer",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Orientation => "orientation sensor",
        };
        f.write_str(name)
    }
}

/// Sensor provider kinds in waterfall priority order
///
/// - **RawVector**: magnetometer + accelerometer vectors, best fidelity and
///   the only source of real field strength
/// - **FusedOrientation**: absolute orientation events fused by the platform
/// - **VendorCompass**: proprietary compass heading, last resort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    RawVector,
    FusedOrientation,
    VendorCompass,
    #[default]
    None,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::RawVector => "raw-vector",
            ProviderKind::FusedOrientation => "fused-orientation",
            ProviderKind::VendorCompass => "vendor-compass",
            ProviderKind::None => "none",
        };
        f.write_str(name)
    }
}

/// Sensor capabilities detected on the host
///
/// Computed once per session start by
/// [`detect_capabilities`](crate::detect::detect_capabilities) and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorCapabilities {
    /// Highest-fidelity provider that responded
    pub provider: ProviderKind,
    pub has_magnetometer: bool,
    pub has_accelerometer: bool,
    pub has_gyroscope: bool,
    pub has_absolute_orientation: bool,
    /// Only true with a raw magnetometer
    pub can_get_field_strength: bool,
    /// Requires an accelerometer or tilt components
    pub can_compensate_tilt: bool,
    /// Platform demands a user gesture before granting sensor access
    pub requires_user_gesture: bool,
    pub supports_wake_lock: bool,
    pub supports_vibration: bool,
}

/// Compass lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompassState {
    #[default]
    Idle,
    Requesting,
    Calibrating,
    ActiveTrusted,
    ActiveUntrusted,
    Background,
}

impl CompassState {
    /// Whether the compass is delivering headings
    pub fn is_active(self) -> bool {
        matches!(self, Self::ActiveTrusted | Self::ActiveUntrusted)
    }

    /// States that are torn down when the host hides the compass
    pub fn can_background(self) -> bool {
        matches!(self, Self::Calibrating) || self.is_active()
    }
}

impl fmt::Display for CompassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompassState::Idle => "IDLE",
            CompassState::Requesting => "REQUESTING",
            CompassState::Calibrating => "CALIBRATING",
            CompassState::ActiveTrusted => "ACTIVE_TRUSTED",
            CompassState::ActiveUntrusted => "ACTIVE_UNTRUSTED",
            CompassState::Background => "BACKGROUND",
        };
        f.write_str(name)
    }
}

/// Heading reliability derived from magnetic field strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// How the device is being held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Posture {
    #[default]
    Flat,
    UprightPortrait,
    UprightLandscape,
}

/// Device tilt in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TiltAngles {
    /// Front-to-back tilt
    pub pitch: f32,
    /// Left-to-right tilt
    pub roll: f32,
    /// Angle between the device Z axis and vertical
    pub tilt: f32,
}

/// Result of one fusion pipeline pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOutput {
    /// Smoothed magnetic heading in `[0, 360)`
    pub heading: f32,
    /// Field magnitude in µT, `None` without a real magnetometer
    pub field_strength: Option<f32>,
    pub confidence: Confidence,
    pub tilt: TiltAngles,
    /// Whether the heading was corrected for pitch and roll
    pub tilt_compensated: bool,
    pub posture: Posture,
}

/// Published compass snapshot
///
/// Recomputed every tick from the pipeline output; the previous snapshot is
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompassData {
    /// Heading to display (true or magnetic depending on configuration)
    pub heading: f32,
    /// Always referenced to magnetic north
    pub heading_magnetic: f32,
    /// Referenced to true north when declination is known
    pub heading_true: Option<f32>,
    /// Field magnitude in µT, `None` when unavailable
    pub field_strength: Option<f32>,
    pub confidence: Confidence,
    pub tilt_compensated: bool,
    pub tilt_angle: f32,
    pub pitch: f32,
    pub roll: f32,
    pub declination: Option<f32>,
    pub posture: Posture,
}

/// Geomagnetic declination at a location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeclinationData {
    /// Degrees, positive east and negative west
    pub declination: f32,
    pub latitude: f64,
    pub longitude: f64,
    /// Approximate accuracy of the estimate in degrees
    pub accuracy: f32,
    pub timestamp: DateTime<Utc>,
}

/// Deviation from a locked target bearing
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    /// Locked bearing in `[0, 360)`
    pub target: f32,
    /// Absolute shortest-arc deviation in degrees
    pub deviation: f32,
    /// Deviation within the lock tolerance
    pub on_target: bool,
    /// Deviation beyond the warning threshold
    pub warning: bool,
}
