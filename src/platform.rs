//! Host platform abstraction
//!
//! The compass never talks to hardware directly. A host (browser bridge,
//! mobile shell, simulator, test double) implements these traits and hands
//! them over bundled in a [`Platform`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::OrientationReading;

/// One raw vector sample from a generic sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Capture time in milliseconds
    pub timestamp: f64,
}

/// Callback payload delivered by a [`VectorSensor`]
#[derive(Debug, Clone, PartialEq)]
pub enum SensorSignal {
    Reading(VectorSample),
    Error(String),
}

pub type VectorListener = Box<dyn FnMut(SensorSignal) + Send>;
pub type OrientationListener = Box<dyn FnMut(OrientationReading) + Send>;

/// Handle to an instantiated vector sensor (magnetometer, accelerometer)
pub trait VectorSensor: Send {
    /// Begin delivering samples to `listener`
    fn start(&mut self, listener: VectorListener) -> Result<()>;

    /// Stop delivery and drop the listener
    fn stop(&mut self);
}

/// Which orientation event stream to listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationChannel {
    /// Earth-referenced orientation events
    Absolute,
    /// Device-relative orientation events, possibly carrying a vendor heading
    Relative,
}

/// Subscription to orientation events
pub trait OrientationStream: Send {
    fn subscribe(&mut self, channel: OrientationChannel, listener: OrientationListener);

    /// Detach the current listener; a no-op when nothing is attached
    fn unsubscribe(&mut self);
}

/// Sensor access offered by the host
#[async_trait]
pub trait SensorHost: Send + Sync {
    /// Instantiate a magnetometer sampling at `frequency` Hz
    ///
    /// An error means the sensor is missing or blocked.
    fn magnetometer(&self, frequency: f32) -> Result<Box<dyn VectorSensor>>;

    fn accelerometer(&self, frequency: f32) -> Result<Box<dyn VectorSensor>>;

    fn has_gyroscope(&self) -> bool;

    /// Whether generic orientation events exist at all
    fn has_orientation_events(&self) -> bool;

    /// Whether an Earth-referenced orientation stream is offered
    fn has_absolute_orientation_events(&self) -> bool;

    /// Open a fresh orientation event stream, `None` without orientation events
    fn orientation_stream(&self) -> Option<Box<dyn OrientationStream>>;

    /// Whether sensor access must be granted from a user gesture first
    fn requires_permission(&self) -> bool;

    /// Ask the user for sensor access; `Ok(false)` means declined
    async fn request_permission(&self) -> Result<bool>;
}

/// Options for a one-shot position request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeolocationRequest {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the host may return
    pub maximum_age: Duration,
}

impl Default for GeolocationRequest {
    fn default() -> Self {
        Self {
            high_accuracy: false,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(60 * 60),
        }
    }
}

/// Geographic position fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy: Option<f64>,
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self, request: GeolocationRequest) -> Result<Position>;
}

/// Screen wake lock support
#[async_trait]
pub trait WakeLockHost: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn request(&self) -> Result<Box<dyn WakeLockSentinel>>;
}

/// A held wake lock; the host may release it on its own (e.g. when hidden)
pub trait WakeLockSentinel: Send {
    fn is_released(&self) -> bool;

    fn release(&mut self);
}

/// Haptic output
pub trait Vibrator: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Play a vibration pattern in milliseconds; returns whether it was accepted
    fn vibrate(&self, pattern: &[u32]) -> bool;
}

/// Every host service the compass uses
///
/// Optional services that are `None` are treated as unsupported.
#[derive(Clone)]
pub struct Platform {
    pub sensors: Arc<dyn SensorHost>,
    pub geolocator: Option<Arc<dyn Geolocator>>,
    pub wake_lock: Option<Arc<dyn WakeLockHost>>,
    pub vibrator: Option<Arc<dyn Vibrator>>,
}

impl Platform {
    pub fn new(sensors: Arc<dyn SensorHost>) -> Self {
        Self {
            sensors,
            geolocator: None,
            wake_lock: None,
            vibrator: None,
        }
    }

    pub fn with_geolocator(mut self, geolocator: Arc<dyn Geolocator>) -> Self {
        self.geolocator = Some(geolocator);
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLockHost>) -> Self {
        self.wake_lock = Some(wake_lock);
        self
    }

    pub fn with_vibrator(mut self, vibrator: Arc<dyn Vibrator>) -> Self {
        self.vibrator = Some(vibrator);
        self
    }

    pub fn supports_wake_lock(&self) -> bool {
        self.wake_lock.as_ref().is_some_and(|host| host.is_supported())
    }

    pub fn supports_vibration(&self) -> bool {
        self.vibrator.as_ref().is_some_and(|vibrator| vibrator.is_supported())
    }
}

impl core::fmt::Debug for Platform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Platform")
            .field("geolocation", &self.geolocator.is_some())
            .field("wake_lock", &self.supports_wake_lock())
            .field("vibration", &self.supports_vibration())
            .finish_non_exhaustive()
    }
}
