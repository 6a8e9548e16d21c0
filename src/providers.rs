//! Sensor provider adapters
//!
//! Each adapter turns one family of host sensors into magnetic and
//! accelerometer readings pushed into a [`ReadingSink`]. Orientation-based
//! adapters synthesize vectors from angles, so they never report a real
//! field strength.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CompassError, Result};
use crate::platform::{
    OrientationChannel, OrientationStream, SensorHost, SensorSignal, VectorListener,
    VectorSample, VectorSensor,
};
use crate::types::{
    AccelerometerReading, MagneticReading, OrientationReading, ProviderKind,
    SensorCapabilities, SensorKind,
};

/// Magnitude of synthesized magnetic vectors in µT
pub const SYNTHETIC_FIELD_STRENGTH: f32 = 50.0;
/// Gravity used for synthesized accelerometer vectors in m/s²
pub const STANDARD_GRAVITY: f32 = 9.8;

/// Event delivered from a sensor callback to the compass
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Magnetic(MagneticReading),
    Accelerometer(AccelerometerReading),
    /// The host reported a sensor error after start
    Failed { sensor: SensorKind, reason: String },
}

/// Destination for sensor events
///
/// Sensor callbacks may fire on any thread, so the sink only forwards
/// events and never touches the fusion pipeline itself.
#[derive(Clone)]
pub struct ReadingSink {
    emit: Arc<dyn Fn(SensorEvent) + Send + Sync>,
}

impl ReadingSink {
    pub fn new(emit: impl Fn(SensorEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Sink backed by an unbounded channel, drained once per frame
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SensorEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let sink = Self::new(move |event| {
            // The receiver is gone once the compass is dropped
            let _ = sender.send(event);
        });
        (sink, receiver)
    }

    pub fn emit(&self, event: SensorEvent) {
        (self.emit)(event);
    }
}

impl core::fmt::Debug for ReadingSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadingSink").finish_non_exhaustive()
    }
}

/// A source of compass readings
#[async_trait]
pub trait SensorProvider: Send {
    fn kind(&self) -> ProviderKind;

    /// Whether magnetic readings come from a physical magnetometer
    fn has_real_magnetometer(&self) -> bool;

    /// Attach listeners and start delivering readings
    ///
    /// A no-op when already active.
    async fn start(&mut self) -> Result<()>;

    /// Detach every listener; safe to call repeatedly or before `start`
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Magnetometer plus optional accelerometer vectors
pub struct RawVectorProvider {
    host: Arc<dyn SensorHost>,
    frequency: f32,
    sink: ReadingSink,
    magnetometer: Option<Box<dyn VectorSensor>>,
    accelerometer: Option<Box<dyn VectorSensor>>,
}

impl RawVectorProvider {
    pub fn new(host: Arc<dyn SensorHost>, frequency: f32, sink: ReadingSink) -> Self {
        Self {
            host,
            frequency,
            sink,
            magnetometer: None,
            accelerometer: None,
        }
    }

    /// Whether an accelerometer is feeding tilt data
    pub fn has_accelerometer(&self) -> bool {
        self.accelerometer.is_some()
    }

    fn open_accelerometer(&self) -> Result<Box<dyn VectorSensor>> {
        let mut accelerometer = self.host.accelerometer(self.frequency)?;
        let listener = vector_listener(self.sink.clone(), SensorKind::Accelerometer, |sample| {
            SensorEvent::Accelerometer(AccelerometerReading::new(
                sample.x,
                sample.y,
                sample.z,
                sample.timestamp,
            ))
        });
        if let Err(err) = accelerometer.start(listener) {
            accelerometer.stop();
            return Err(err);
        }
        Ok(accelerometer)
    }
}

#[async_trait]
impl SensorProvider for RawVectorProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RawVector
    }

    fn has_real_magnetometer(&self) -> bool {
        true
    }

    async fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let mut magnetometer = self.host.magnetometer(self.frequency)?;
        let listener = vector_listener(self.sink.clone(), SensorKind::Magnetometer, |sample| {
            SensorEvent::Magnetic(MagneticReading::new(
                sample.x,
                sample.y,
                sample.z,
                sample.timestamp,
            ))
        });
        if let Err(err) = magnetometer.start(listener) {
            magnetometer.stop();
            return Err(err);
        }
        self.magnetometer = Some(magnetometer);

        match self.open_accelerometer() {
            Ok(accelerometer) => self.accelerometer = Some(accelerometer),
            Err(err) => warn!(%err, "accelerometer unavailable, tilt compensation disabled"),
        }

        debug!(
            frequency = self.frequency,
            accelerometer = self.accelerometer.is_some(),
            "raw vector sensors started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut magnetometer) = self.magnetometer.take() {
            magnetometer.stop();
        }
        if let Some(mut accelerometer) = self.accelerometer.take() {
            accelerometer.stop();
        }
    }

    fn is_active(&self) -> bool {
        self.magnetometer.is_some()
    }
}

fn vector_listener(
    sink: ReadingSink,
    sensor: SensorKind,
    reading: fn(VectorSample) -> SensorEvent,
) -> VectorListener {
    Box::new(move |signal| match signal {
        SensorSignal::Reading(sample) => sink.emit(reading(sample)),
        SensorSignal::Error(reason) => {
            warn!(%sensor, %reason, "sensor error");
            sink.emit(SensorEvent::Failed { sensor, reason });
        }
    })
}

/// Convert an orientation event into synthetic magnetic and gravity vectors
///
/// A vendor compass heading `h` takes precedence and yields a horizontal
/// field `(sin h, cos h, 0)·50 µT`. Otherwise `alpha` (counter-clockwise) is
/// turned into `h = 360 − alpha` the same way, and `beta`/`gamma` become a
/// gravity vector when both are present. Events with neither heading source
/// yield `None`.
///
/// # Example
/// ```
/// use compass_fusion::OrientationReading;
/// use compass_fusion::providers::synthesize_readings;
///
/// let reading = OrientationReading {
///     compass_heading: Some(90.0),
///     ..Default::default()
/// };
/// let (magnetic, gravity) = synthesize_readings(&reading).unwrap();
/// assert!((magnetic.vector.x - 50.0).abs() < 1e-4);
/// assert!(gravity.is_none());
/// ```
pub fn synthesize_readings(
    reading: &OrientationReading,
) -> Option<(MagneticReading, Option<AccelerometerReading>)> {
    let timestamp = reading.timestamp;

    if let Some(heading) = reading.compass_heading {
        return Some((synthetic_field(heading, timestamp), None));
    }

    let alpha = reading.alpha?;
    let magnetic = synthetic_field(360.0 - alpha, timestamp);

    let gravity = reading.beta.zip(reading.gamma).map(|(beta, gamma)| {
        let (sin_beta, cos_beta) = beta.to_radians().sin_cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();
        AccelerometerReading::new(
            sin_gamma * STANDARD_GRAVITY,
            sin_beta * STANDARD_GRAVITY,
            cos_beta * cos_gamma * STANDARD_GRAVITY,
            timestamp,
        )
    });

    Some((magnetic, gravity))
}

fn synthetic_field(heading: f32, timestamp: f64) -> MagneticReading {
    let (sin, cos) = heading.to_radians().sin_cos();
    MagneticReading::new(
        sin * SYNTHETIC_FIELD_STRENGTH,
        cos * SYNTHETIC_FIELD_STRENGTH,
        0.0,
        timestamp,
    )
}

/// Orientation event subscription shared by the angle-based adapters
struct OrientationSubscription {
    host: Arc<dyn SensorHost>,
    sink: ReadingSink,
    channel: OrientationChannel,
    stream: Option<Box<dyn OrientationStream>>,
    permission_granted: bool,
}

impl OrientationSubscription {
    fn new(host: Arc<dyn SensorHost>, sink: ReadingSink, channel: OrientationChannel) -> Self {
        Self {
            host,
            sink,
            channel,
            stream: None,
            permission_granted: false,
        }
    }

    async fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        self.ensure_permission().await?;

        let mut stream =
            self.host
                .orientation_stream()
                .ok_or_else(|| CompassError::SensorUnavailable {
                    sensor: SensorKind::Orientation,
                    reason: "orientation events not supported".into(),
                })?;

        let sink = self.sink.clone();
        stream.subscribe(
            self.channel,
            Box::new(move |reading| {
                if let Some((magnetic, gravity)) = synthesize_readings(&reading) {
                    if let Some(gravity) = gravity {
                        sink.emit(SensorEvent::Accelerometer(gravity));
                    }
                    sink.emit(SensorEvent::Magnetic(magnetic));
                }
            }),
        );
        debug!(channel = ?self.channel, "orientation listener attached");

        self.stream = Some(stream);
        Ok(())
    }

    async fn ensure_permission(&mut self) -> Result<()> {
        if self.permission_granted || !self.host.requires_permission() {
            return Ok(());
        }

        match self.host.request_permission().await {
            Ok(true) => {
                debug!("orientation permission granted");
                self.permission_granted = true;
                Ok(())
            }
            Ok(false) => {
                debug!("orientation permission declined");
                Err(CompassError::PermissionDenied)
            }
            Err(err) => {
                debug!(%err, "orientation permission request failed");
                Err(CompassError::PermissionDenied)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.unsubscribe();
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

/// Platform-fused absolute orientation events
pub struct FusedOrientationProvider {
    subscription: OrientationSubscription,
}

impl FusedOrientationProvider {
    /// Listens on the absolute stream when the host offers one, else the
    /// relative stream
    pub fn new(host: Arc<dyn SensorHost>, sink: ReadingSink) -> Self {
        let channel = if host.has_absolute_orientation_events() {
            OrientationChannel::Absolute
        } else {
            OrientationChannel::Relative
        };
        Self {
            subscription: OrientationSubscription::new(host, sink, channel),
        }
    }
}

#[async_trait]
impl SensorProvider for FusedOrientationProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FusedOrientation
    }

    fn has_real_magnetometer(&self) -> bool {
        false
    }

    async fn start(&mut self) -> Result<()> {
        self.subscription.start().await
    }

    fn stop(&mut self) {
        self.subscription.stop();
    }

    fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

/// Vendor-proprietary compass heading on relative orientation events
pub struct VendorCompassProvider {
    subscription: OrientationSubscription,
}

impl VendorCompassProvider {
    pub fn new(host: Arc<dyn SensorHost>, sink: ReadingSink) -> Self {
        Self {
            subscription: OrientationSubscription::new(host, sink, OrientationChannel::Relative),
        }
    }
}

#[async_trait]
impl SensorProvider for VendorCompassProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::VendorCompass
    }

    fn has_real_magnetometer(&self) -> bool {
        false
    }

    async fn start(&mut self) -> Result<()> {
        self.subscription.start().await
    }

    fn stop(&mut self) {
        self.subscription.stop();
    }

    fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

/// Build the adapter for the detected provider
///
/// # Returns
/// `None` when no provider was detected
pub fn create_provider(
    capabilities: &SensorCapabilities,
    host: Arc<dyn SensorHost>,
    frequency: f32,
    sink: ReadingSink,
) -> Option<Box<dyn SensorProvider>> {
    match capabilities.provider {
        ProviderKind::RawVector => Some(Box::new(RawVectorProvider::new(host, frequency, sink))),
        ProviderKind::FusedOrientation => Some(Box::new(FusedOrientationProvider::new(host, sink))),
        ProviderKind::VendorCompass => Some(Box::new(VendorCompassProvider::new(host, sink))),
        ProviderKind::None => None,
    }
}
