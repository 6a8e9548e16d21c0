//! Compass lifecycle state machine
//!
//! ```text
//! Idle -> Requesting -> Calibrating -> ActiveTrusted <-> ActiveUntrusted
//!                            \               |
//!                             +--------> Background -> (previous state)
//! ```
//!
//! [`Compass`] owns every resource of a session: the sensor provider, the
//! fusion pipeline, the calibration schedule, the wake lock and the
//! published snapshot. It is driven from one task; sensor callbacks only
//! push events into a channel that [`Compass::tick`] drains.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::calibration::CalibrationSchedule;
use crate::config::{CompassConfig, CompassConfigUpdate};
use crate::declination::{DeclinationService, magnetic_to_true};
use crate::detect::detect_capabilities;
use crate::error::{CompassError, Result};
use crate::fusion::{FusionSettings, SensorFusion};
use crate::math::angular_difference;
use crate::platform::{Platform, WakeLockSentinel};
use crate::providers::{ReadingSink, SensorEvent, SensorProvider, create_provider};
use crate::types::{
    CompassData, CompassState, Confidence, DeclinationData, FusionOutput, LockStatus,
    ProviderKind, SensorCapabilities,
};

/// Vibration pattern played when the heading reaches the locked bearing
pub const LOCK_HAPTIC_PATTERN: &[u32] = &[50];

/// Pending host request for a screen wake lock
pub type WakeLockRequest =
    Pin<Box<dyn Future<Output = Result<Box<dyn WakeLockSentinel>>> + Send>>;

/// Compass session
///
/// # Example
/// ```no_run
/// use compass_fusion::{Compass, Platform};
/// # async fn run(platform: Platform) -> compass_fusion::Result<()> {
/// let mut compass = Compass::new(platform);
/// compass.start().await?;
///
/// let mut frames = tokio::time::interval(compass_fusion::driver::FRAME_PERIOD);
/// loop {
///     let now = frames.tick().await;
///     compass.tick(now);
///     if let Some(data) = compass.data() {
///         println!("{:.0}°", data.heading);
///     }
/// }
/// # }
/// ```
pub struct Compass {
    platform: Platform,
    config: CompassConfig,
    state: CompassState,
    capabilities: Option<SensorCapabilities>,
    provider: Option<Box<dyn SensorProvider>>,
    sink: ReadingSink,
    events: mpsc::UnboundedReceiver<SensorEvent>,
    fusion: SensorFusion,
    declination_service: DeclinationService,
    pending_declination: Option<oneshot::Receiver<Option<DeclinationData>>>,
    declination: Option<DeclinationData>,
    calibration: CalibrationSchedule,
    data: Option<CompassData>,
    last_error: Option<CompassError>,
    wake_lock: Option<Box<dyn WakeLockSentinel>>,
    frame_loop: bool,
    state_before_background: CompassState,
    backgrounded_at: Option<Instant>,
    on_target: bool,
}

impl Compass {
    pub fn new(platform: Platform) -> Self {
        Self::with_config(platform, CompassConfig::default())
    }

    pub fn with_config(platform: Platform, config: CompassConfig) -> Self {
        let (sink, events) = ReadingSink::channel();
        let declination_service = DeclinationService::new(platform.geolocator.clone());
        let fusion = SensorFusion::with_settings(FusionSettings {
            alpha: config.low_pass_alpha,
            ..Default::default()
        });

        Self {
            platform,
            config,
            state: CompassState::Idle,
            capabilities: None,
            provider: None,
            sink,
            events,
            fusion,
            declination_service,
            pending_declination: None,
            declination: None,
            calibration: CalibrationSchedule::default(),
            data: None,
            last_error: None,
            wake_lock: None,
            frame_loop: false,
            state_before_background: CompassState::Idle,
            backgrounded_at: None,
            on_target: false,
        }
    }

    /// Detect sensors, start the best provider and begin calibrating
    ///
    /// Only acts from `Idle`. On failure the compass returns to `Idle`, every
    /// sensor is released and the error is kept in [`Compass::last_error`].
    pub async fn start(&mut self) -> Result<()> {
        if self.state != CompassState::Idle {
            debug!(state = %self.state, "start ignored");
            return Ok(());
        }

        self.last_error = None;
        self.transition(CompassState::Requesting);

        if let Err(err) = self.acquire_sensors().await {
            self.release_sensors();
            self.fail(err.clone());
            return Err(err);
        }

        self.resolve_declination();
        self.calibration.begin(Instant::now());
        self.transition(CompassState::Calibrating);
        self.frame_loop = true;
        Ok(())
    }

    async fn acquire_sensors(&mut self) -> Result<()> {
        let capabilities = detect_capabilities(&self.platform).await;
        self.capabilities = Some(capabilities);

        let mut provider = create_provider(
            &capabilities,
            self.platform.sensors.clone(),
            self.config.sensor_frequency,
            self.sink.clone(),
        )
        .ok_or(CompassError::NoSensorsAvailable)?;

        self.fusion
            .set_real_magnetometer(provider.has_real_magnetometer());

        let started = provider.start().await;
        self.provider = Some(provider);
        started
    }

    /// Use the cached declination or resolve it in the background
    fn resolve_declination(&mut self) {
        if let Some(cached) = self.declination_service.cached() {
            self.declination = Some(cached);
            return;
        }
        if self.pending_declination.is_some() || !self.declination_service.is_supported() {
            return;
        }

        let service = self.declination_service.clone();
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let _ = sender.send(service.get_declination().await);
        });
        self.pending_declination = Some(receiver);
    }

    /// Run one frame
    ///
    /// Does nothing unless the frame loop is running. Drains pending sensor
    /// events, advances calibration, recomputes the snapshot and applies
    /// confidence transitions.
    pub fn tick(&mut self, now: Instant) {
        if !self.frame_loop {
            return;
        }

        self.poll_declination();
        self.poll_wake_lock();
        self.drain_events();

        if self.state == CompassState::Calibrating && self.calibration.advance(now) {
            self.transition(CompassState::ActiveTrusted);
        }

        let Some(output) = self.fusion.process() else {
            return;
        };

        let data = self.compose(&output);
        trace!(
            heading = data.heading,
            field_strength = ?data.field_strength,
            confidence = ?data.confidence,
            "frame"
        );
        self.data = Some(data);

        match (self.state, output.confidence) {
            (CompassState::ActiveTrusted, Confidence::Low) => {
                warn!(field_strength = ?output.field_strength, "magnetic interference detected");
                self.transition(CompassState::ActiveUntrusted);
            }
            (CompassState::ActiveUntrusted, Confidence::High) => {
                self.transition(CompassState::ActiveTrusted);
            }
            _ => {}
        }

        self.update_lock_feedback(data.heading);
    }

    fn compose(&self, output: &FusionOutput) -> CompassData {
        let declination = self.declination.map(|data| data.declination);
        let heading_true = declination.map(|declination| magnetic_to_true(output.heading, declination));
        let heading = match heading_true {
            Some(heading) if self.config.show_true_north => heading,
            _ => output.heading,
        };

        CompassData {
            heading,
            heading_magnetic: output.heading,
            heading_true,
            field_strength: output.field_strength,
            confidence: output.confidence,
            tilt_compensated: output.tilt_compensated,
            tilt_angle: output.tilt.tilt,
            pitch: output.tilt.pitch,
            roll: output.tilt.roll,
            declination,
            posture: output.posture,
        }
    }

    fn poll_declination(&mut self) {
        let Some(receiver) = self.pending_declination.as_mut() else {
            return;
        };

        match receiver.try_recv() {
            Ok(resolved) => {
                self.pending_declination = None;
                if let Some(data) = resolved {
                    info!(declination = data.declination, "true north available");
                    self.declination = Some(data);
                }
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => self.pending_declination = None,
        }
    }

    fn poll_wake_lock(&mut self) {
        if self.wake_lock.as_ref().is_some_and(|sentinel| sentinel.is_released()) {
            debug!("wake lock released by host");
            self.wake_lock = None;
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let result = match event {
                SensorEvent::Magnetic(reading) => self.fusion.update_magnetic(&reading),
                SensorEvent::Accelerometer(reading) => self.fusion.update_accelerometer(&reading),
                SensorEvent::Failed { sensor, reason } => {
                    Err(CompassError::SensorRead { sensor, reason })
                }
            };

            if let Err(err) = result {
                warn!(%err, "sensor reading dropped");
                self.last_error = Some(err);
            }
        }
    }

    fn discard_events(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    /// Edge-triggered haptic pulse when the heading enters the lock tolerance
    fn update_lock_feedback(&mut self, heading: f32) {
        let Some(target) = self.config.target_bearing else {
            self.on_target = false;
            return;
        };

        let on_target = angular_difference(heading, target).abs() <= self.config.lock_tolerance;
        if on_target && !self.on_target && self.config.enable_haptics {
            if let Some(vibrator) = self.platform.vibrator.as_ref().filter(|v| v.is_supported()) {
                if !vibrator.vibrate(LOCK_HAPTIC_PATTERN) {
                    debug!("vibration request rejected");
                }
            }
        }
        self.on_target = on_target;
    }

    /// Host visibility change
    ///
    /// Hiding a calibrating or active compass stops its sensors and frame
    /// loop. Showing it again restarts the same provider and returns to the
    /// state it was in; a restart failure stops the compass entirely.
    pub async fn set_visible(&mut self, visible: bool, now: Instant) -> Result<()> {
        if !visible {
            if self.state.can_background() {
                self.state_before_background = self.state;
                self.backgrounded_at = Some(now);
                self.frame_loop = false;
                self.stop_provider();
                self.transition(CompassState::Background);
            }
            return Ok(());
        }

        if self.state != CompassState::Background {
            return Ok(());
        }

        let restarted = match self.provider.as_mut() {
            Some(provider) => provider.start().await,
            None => Err(CompassError::NoSensorsAvailable),
        };
        if let Err(err) = restarted {
            self.stop();
            self.fail(err.clone());
            return Err(err);
        }

        if let Some(paused_at) = self.backgrounded_at.take() {
            self.calibration.rebase(paused_at, now);
        }
        self.frame_loop = true;
        self.transition(self.state_before_background);
        Ok(())
    }

    /// Stop sensors, clear the session and return to `Idle`
    pub fn stop(&mut self) {
        if self.state == CompassState::Idle {
            return;
        }

        self.frame_loop = false;
        self.release_sensors();
        self.fusion.reset();
        self.data = None;
        // An unfinished lookup is abandoned so the next start asks again
        self.pending_declination = None;
        self.calibration.reset();
        self.backgrounded_at = None;
        self.on_target = false;
        self.transition(CompassState::Idle);
    }

    /// Restart calibration; only from an active state
    pub fn request_calibration(&mut self, now: Instant) {
        if !self.state.is_active() {
            debug!(state = %self.state, "calibration request ignored");
            return;
        }

        self.fusion.reset();
        self.calibration.begin(now);
        self.transition(CompassState::Calibrating);
    }

    /// Validate and merge a partial configuration update
    ///
    /// A new sampling frequency applies from the next start.
    pub fn update_config(&mut self, update: CompassConfigUpdate) -> Result<()> {
        self.config.merge(update)?;

        if update.low_pass_alpha.is_some() {
            self.fusion.set_alpha(self.config.low_pass_alpha);
        }
        if update.target_bearing.is_some() {
            self.on_target = false;
        }
        debug!(config = ?self.config, "configuration updated");
        Ok(())
    }

    /// Lock onto a bearing, or unlock with `None`
    pub fn set_target_bearing(&mut self, bearing: Option<f32>) -> Result<()> {
        self.update_config(CompassConfigUpdate::target_bearing(bearing))
    }

    /// Acquire or release the screen wake lock
    ///
    /// Waits for the host to grant the lock. Callers that must keep
    /// ticking while the host decides use [`Compass::begin_wake_lock_toggle`]
    /// and [`Compass::finish_wake_lock_toggle`] instead.
    ///
    /// # Returns
    /// Whether the wake lock is held afterwards
    pub async fn toggle_wake_lock(&mut self) -> Result<bool> {
        match self.begin_wake_lock_toggle()? {
            Some(request) => {
                let granted = request.await;
                self.finish_wake_lock_toggle(granted)
            }
            None => Ok(false),
        }
    }

    /// Release a held wake lock, or hand back the host request for a new one
    ///
    /// Returns `None` when the lock was released. The returned request owns
    /// everything it needs, so it can be awaited alongside the frame loop;
    /// pass its output to [`Compass::finish_wake_lock_toggle`].
    pub fn begin_wake_lock_toggle(&mut self) -> Result<Option<WakeLockRequest>> {
        let Some(host) = self
            .platform
            .wake_lock
            .clone()
            .filter(|host| host.is_supported())
        else {
            return self.soft_error(CompassError::WakeLockUnsupported);
        };

        if let Some(mut sentinel) = self.wake_lock.take() {
            if !sentinel.is_released() {
                sentinel.release();
                debug!("wake lock released");
                return Ok(None);
            }
        }

        debug!("wake lock requested");
        let request: WakeLockRequest = Box::pin(async move { host.request().await });
        Ok(Some(request))
    }

    /// Store the outcome of a request from [`Compass::begin_wake_lock_toggle`]
    ///
    /// # Returns
    /// Whether the wake lock is held afterwards
    pub fn finish_wake_lock_toggle(
        &mut self,
        granted: Result<Box<dyn WakeLockSentinel>>,
    ) -> Result<bool> {
        match granted {
            Ok(sentinel) => {
                debug!("wake lock acquired");
                if let Some(mut previous) = self.wake_lock.replace(sentinel) {
                    previous.release();
                }
                Ok(true)
            }
            Err(err @ CompassError::WakeLockFailed(_)) => self.soft_error(err),
            Err(err) => self.soft_error(CompassError::WakeLockFailed(err.to_string())),
        }
    }

    /// Stop everything and release the wake lock
    pub fn shutdown(&mut self) {
        self.stop();
        self.release_sensors();
        if let Some(mut sentinel) = self.wake_lock.take() {
            sentinel.release();
        }
    }

    pub fn state(&self) -> CompassState {
        self.state
    }

    /// Latest snapshot, `None` before the first processed frame
    pub fn data(&self) -> Option<CompassData> {
        self.data
    }

    pub fn config(&self) -> &CompassConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Option<SensorCapabilities> {
        self.capabilities
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.capabilities
            .map(|capabilities| capabilities.provider)
            .unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<&CompassError> {
        self.last_error.as_ref()
    }

    pub fn calibration_progress(&self) -> u8 {
        self.calibration.progress()
    }

    pub fn is_calibrating(&self) -> bool {
        self.state == CompassState::Calibrating
    }

    pub fn is_locked(&self) -> bool {
        self.config.target_bearing.is_some()
    }

    /// Deviation of the displayed heading from the locked bearing
    pub fn lock_status(&self) -> Option<LockStatus> {
        let target = self.config.target_bearing?;
        let heading = self.data?.heading;
        Some(lock_status(heading, target, &self.config))
    }

    pub fn wake_lock_active(&self) -> bool {
        self.wake_lock
            .as_ref()
            .is_some_and(|sentinel| !sentinel.is_released())
    }

    pub fn declination(&self) -> Option<DeclinationData> {
        self.declination
    }

    pub fn true_north_available(&self) -> bool {
        self.declination.is_some()
    }

    pub fn is_frame_loop_running(&self) -> bool {
        self.frame_loop
    }

    fn transition(&mut self, next: CompassState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "compass state changed");
            self.state = next;
        }
    }

    fn fail(&mut self, err: CompassError) {
        warn!(%err, "compass stopped");
        self.last_error = Some(err);
        self.transition(CompassState::Idle);
    }

    fn soft_error<T>(&mut self, err: CompassError) -> Result<T> {
        warn!(%err, "compass feature unavailable");
        self.last_error = Some(err.clone());
        Err(err)
    }

    /// Detach listeners but keep the provider for a later restart
    fn stop_provider(&mut self) {
        if let Some(provider) = self.provider.as_mut() {
            provider.stop();
        }
        self.discard_events();
    }

    fn release_sensors(&mut self) {
        self.stop_provider();
        self.provider = None;
    }
}

impl Drop for Compass {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for Compass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Compass")
            .field("state", &self.state)
            .field("provider", &self.provider_kind())
            .field("config", &self.config)
            .field("data", &self.data)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

/// Deviation of `heading` from `target` under the configured thresholds
///
/// # Example
/// ```
/// use compass_fusion::CompassConfig;
/// use compass_fusion::orchestrator::lock_status;
///
/// let config = CompassConfig::default();
/// let status = lock_status(95.0, 90.0, &config);
/// assert_eq!(status.deviation, 5.0);
/// assert!(!status.warning);
/// assert!(lock_status(100.0, 90.0, &config).warning);
/// ```
pub fn lock_status(heading: f32, target: f32, config: &CompassConfig) -> LockStatus {
    let deviation = angular_difference(heading, target).abs();
    LockStatus {
        target,
        deviation,
        on_target: deviation <= config.lock_tolerance,
        warning: deviation > config.deviation_warning,
    }
}
