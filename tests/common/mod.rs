#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use compass_fusion::driver::FRAME_PERIOD;
use compass_fusion::platform::{
    GeolocationRequest, Geolocator, OrientationChannel, OrientationListener, OrientationStream,
    Position, SensorHost, SensorSignal, VectorListener, VectorSample, VectorSensor, Vibrator,
    WakeLockHost, WakeLockSentinel,
};
use compass_fusion::{Compass, CompassError, OrientationReading, Platform, Result, SensorKind};
use parking_lot::Mutex;
use tokio::time::Instant;

pub const GRAVITY: f32 = 9.81;

/// What the scripted host claims to support
#[derive(Debug, Clone, Default)]
pub struct HostScript {
    pub magnetometer: bool,
    pub accelerometer: bool,
    pub gyroscope: bool,
    pub orientation_events: bool,
    pub absolute_orientation: bool,
    /// Delivered immediately to every absolute-channel subscriber
    pub absolute_event: Option<OrientationReading>,
    pub requires_permission: bool,
    pub grant_permission: bool,
}

impl HostScript {
    pub fn raw_vector() -> Self {
        Self {
            magnetometer: true,
            accelerometer: true,
            gyroscope: true,
            orientation_events: true,
            absolute_orientation: true,
            ..Default::default()
        }
    }

    pub fn fused_orientation() -> Self {
        Self {
            orientation_events: true,
            absolute_orientation: true,
            absolute_event: Some(OrientationReading {
                alpha: Some(0.0),
                beta: Some(0.0),
                gamma: Some(0.0),
                absolute: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Orientation events exist but no absolute event ever arrives
    pub fn vendor_compass() -> Self {
        Self {
            orientation_events: true,
            ..Default::default()
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_permission(mut self, grant: bool) -> Self {
        self.requires_permission = true;
        self.grant_permission = grant;
        self
    }
}

#[derive(Default)]
struct HostState {
    magnetometer: Option<VectorListener>,
    accelerometer: Option<VectorListener>,
    orientation: Option<(OrientationChannel, OrientationListener)>,
    magnetometer_starts: usize,
    permission_requests: usize,
    fail_magnetometer_start: bool,
}

/// Scripted sensor host that lets tests push readings into active listeners
#[derive(Clone)]
pub struct MockHost {
    script: HostScript,
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    pub fn new(script: HostScript) -> Self {
        Self {
            script,
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn emit_magnetic(&self, x: f32, y: f32, z: f32) {
        let mut state = self.state.lock();
        if let Some(listener) = state.magnetometer.as_mut() {
            listener(SensorSignal::Reading(sample(x, y, z)));
        }
    }

    pub fn emit_accelerometer(&self, x: f32, y: f32, z: f32) {
        let mut state = self.state.lock();
        if let Some(listener) = state.accelerometer.as_mut() {
            listener(SensorSignal::Reading(sample(x, y, z)));
        }
    }

    pub fn emit_magnetometer_error(&self, reason: &str) {
        let mut state = self.state.lock();
        if let Some(listener) = state.magnetometer.as_mut() {
            listener(SensorSignal::Error(reason.to_string()));
        }
    }

    pub fn emit_orientation(&self, reading: OrientationReading) {
        let mut state = self.state.lock();
        if let Some((_, listener)) = state.orientation.as_mut() {
            listener(reading);
        }
    }

    /// Flat device with a ~45 µT field pointing north
    pub fn emit_flat_north(&self) {
        self.emit_accelerometer(0.0, 0.0, GRAVITY);
        self.emit_magnetic(0.0, 40.0, -20.0);
    }

    pub fn magnetometer_active(&self) -> bool {
        self.state.lock().magnetometer.is_some()
    }

    pub fn accelerometer_active(&self) -> bool {
        self.state.lock().accelerometer.is_some()
    }

    pub fn orientation_channel(&self) -> Option<OrientationChannel> {
        self.state.lock().orientation.as_ref().map(|(channel, _)| *channel)
    }

    pub fn magnetometer_starts(&self) -> usize {
        self.state.lock().magnetometer_starts
    }

    pub fn permission_requests(&self) -> usize {
        self.state.lock().permission_requests
    }

    pub fn fail_magnetometer_start(&self, fail: bool) {
        self.state.lock().fail_magnetometer_start = fail;
    }
}

fn sample(x: f32, y: f32, z: f32) -> VectorSample {
    VectorSample {
        x,
        y,
        z,
        timestamp: 0.0,
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Magnetometer,
    Accelerometer,
}

struct MockSensor {
    slot: Slot,
    state: Arc<Mutex<HostState>>,
}

impl VectorSensor for MockSensor {
    fn start(&mut self, listener: VectorListener) -> Result<()> {
        let mut state = self.state.lock();
        match self.slot {
            Slot::Magnetometer => {
                if state.fail_magnetometer_start {
                    return Err(CompassError::SensorUnavailable {
                        sensor: SensorKind::Magnetometer,
                        reason: "sensor blocked".into(),
                    });
                }
                state.magnetometer_starts += 1;
                state.magnetometer = Some(listener);
            }
            Slot::Accelerometer => state.accelerometer = Some(listener),
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        match self.slot {
            Slot::Magnetometer => state.magnetometer = None,
            Slot::Accelerometer => state.accelerometer = None,
        }
    }
}

struct MockStream {
    absolute_event: Option<OrientationReading>,
    state: Arc<Mutex<HostState>>,
}

impl OrientationStream for MockStream {
    fn subscribe(&mut self, channel: OrientationChannel, mut listener: OrientationListener) {
        if channel == OrientationChannel::Absolute {
            if let Some(event) = self.absolute_event {
                listener(event);
            }
        }
        self.state.lock().orientation = Some((channel, listener));
    }

    fn unsubscribe(&mut self) {
        self.state.lock().orientation = None;
    }
}

#[async_trait]
impl SensorHost for MockHost {
    fn magnetometer(&self, _frequency: f32) -> Result<Box<dyn VectorSensor>> {
        if !self.script.magnetometer {
            return Err(unavailable(SensorKind::Magnetometer));
        }
        Ok(Box::new(MockSensor {
            slot: Slot::Magnetometer,
            state: self.state.clone(),
        }))
    }

    fn accelerometer(&self, _frequency: f32) -> Result<Box<dyn VectorSensor>> {
        if !self.script.accelerometer {
            return Err(unavailable(SensorKind::Accelerometer));
        }
        Ok(Box::new(MockSensor {
            slot: Slot::Accelerometer,
            state: self.state.clone(),
        }))
    }

    fn has_gyroscope(&self) -> bool {
        self.script.gyroscope
    }

    fn has_orientation_events(&self) -> bool {
        self.script.orientation_events
    }

    fn has_absolute_orientation_events(&self) -> bool {
        self.script.absolute_orientation
    }

    fn orientation_stream(&self) -> Option<Box<dyn OrientationStream>> {
        if !self.script.orientation_events {
            return None;
        }
        Some(Box::new(MockStream {
            absolute_event: self.script.absolute_event,
            state: self.state.clone(),
        }))
    }

    fn requires_permission(&self) -> bool {
        self.script.requires_permission
    }

    async fn request_permission(&self) -> Result<bool> {
        self.state.lock().permission_requests += 1;
        Ok(self.script.grant_permission)
    }
}

fn unavailable(sensor: SensorKind) -> CompassError {
    CompassError::SensorUnavailable {
        sensor,
        reason: "not present".into(),
    }
}

/// Geolocator that answers after `delay` with a fixed result
pub struct MockGeolocator {
    pub result: Result<Position>,
    pub delay: Duration,
    calls: AtomicUsize,
}

impl MockGeolocator {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            result: Ok(Position {
                latitude,
                longitude,
                altitude: None,
                accuracy: Some(100.0),
            }),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(CompassError::GeolocationUnavailable(
                "User denied Geolocation".into(),
            )),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of position requests received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geolocator for MockGeolocator {
    async fn current_position(&self, _request: GeolocationRequest) -> Result<Position> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.result.clone()
    }
}

pub struct MockWakeLock {
    pub supported: bool,
    pub fail: bool,
    /// How long the host takes to answer a request
    pub delay: Duration,
    issued: Mutex<Vec<Arc<AtomicBool>>>,
}

impl MockWakeLock {
    pub fn new(supported: bool) -> Self {
        Self {
            supported,
            fail: false,
            delay: Duration::ZERO,
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the host dropping the lock, e.g. when the screen turns off
    pub fn release_externally(&self) {
        for released in self.issued.lock().iter() {
            released.store(true, Ordering::SeqCst);
        }
    }

    pub fn held(&self) -> usize {
        self.issued
            .lock()
            .iter()
            .filter(|released| !released.load(Ordering::SeqCst))
            .count()
    }
}

struct MockSentinel {
    released: Arc<AtomicBool>,
}

impl WakeLockSentinel for MockSentinel {
    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WakeLockHost for MockWakeLock {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request(&self) -> Result<Box<dyn WakeLockSentinel>> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(CompassError::WakeLockFailed("NotAllowedError".into()));
        }
        let released = Arc::new(AtomicBool::new(false));
        self.issued.lock().push(released.clone());
        Ok(Box::new(MockSentinel { released }))
    }
}

#[derive(Default)]
pub struct MockVibrator {
    pulses: Mutex<Vec<Vec<u32>>>,
}

impl MockVibrator {
    pub fn pulses(&self) -> usize {
        self.pulses.lock().len()
    }
}

impl Vibrator for MockVibrator {
    fn is_supported(&self) -> bool {
        true
    }

    fn vibrate(&self, pattern: &[u32]) -> bool {
        self.pulses.lock().push(pattern.to_vec());
        true
    }
}

pub fn platform(host: &MockHost) -> Platform {
    Platform::new(Arc::new(host.clone()))
}

/// Advance paused time by one frame and return the new instant
pub async fn next_frame() -> Instant {
    tokio::time::advance(FRAME_PERIOD).await;
    Instant::now()
}

/// Let spawned tasks run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Feed a flat, north-facing reading every frame for `frames` frames
pub async fn run_flat_north(compass: &mut Compass, host: &MockHost, frames: usize) {
    for _ in 0..frames {
        host.emit_flat_north();
        let now = next_frame().await;
        compass.tick(now);
    }
}

/// Start a raw-vector compass and run it through calibration
pub async fn active_raw_compass(host: &MockHost, platform: Platform) -> Compass {
    let mut compass = Compass::new(platform);
    compass.start().await.expect("raw vector start");
    run_flat_north(&mut compass, host, 130).await;
    compass
}
