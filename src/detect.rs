//! Sensor capability detection
//!
//! Probes the host once per session in fidelity order and settles on the
//! first provider that works:
//!
//! 1. Raw magnetometer (and optional accelerometer) vectors
//! 2. Platform-fused absolute orientation events
//! 3. Vendor compass heading on relative orientation events

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::platform::{OrientationChannel, Platform, SensorHost};
use crate::types::{ProviderKind, SensorCapabilities};

/// How long to wait for the first absolute orientation event
pub const ORIENTATION_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Sampling rate used when probing raw sensors
const PROBE_FREQUENCY: f32 = 1.0;

/// Detect which sensors the host offers and pick the best provider
pub async fn detect_capabilities(platform: &Platform) -> SensorCapabilities {
    let host = platform.sensors.as_ref();
    let mut capabilities = SensorCapabilities {
        supports_wake_lock: platform.supports_wake_lock(),
        supports_vibration: platform.supports_vibration(),
        ..Default::default()
    };

    match host.magnetometer(PROBE_FREQUENCY) {
        Ok(mut probe) => {
            probe.stop();

            let has_accelerometer = match host.accelerometer(PROBE_FREQUENCY) {
                Ok(mut probe) => {
                    probe.stop();
                    true
                }
                Err(err) => {
                    debug!(%err, "accelerometer probe failed");
                    false
                }
            };

            capabilities.provider = ProviderKind::RawVector;
            capabilities.has_magnetometer = true;
            capabilities.has_accelerometer = has_accelerometer;
            capabilities.has_gyroscope = host.has_gyroscope();
            capabilities.has_absolute_orientation = host.has_absolute_orientation_events();
            capabilities.can_get_field_strength = true;
            capabilities.can_compensate_tilt = has_accelerometer;
            return selected(capabilities);
        }
        Err(err) => debug!(%err, "raw magnetometer unavailable"),
    }

    if !host.has_orientation_events() {
        debug!("no orientation events");
        return selected(capabilities);
    }

    capabilities.requires_user_gesture = host.requires_permission();

    if probe_absolute_orientation(host).await {
        capabilities.provider = ProviderKind::FusedOrientation;
        capabilities.has_absolute_orientation = true;
        // beta and gamma provide tilt
        capabilities.can_compensate_tilt = true;
        return selected(capabilities);
    }
    debug!(timeout = ?ORIENTATION_PROBE_TIMEOUT, "no absolute orientation event");

    capabilities.provider = ProviderKind::VendorCompass;
    selected(capabilities)
}

fn selected(capabilities: SensorCapabilities) -> SensorCapabilities {
    info!(provider = %capabilities.provider, "sensor provider selected");
    capabilities
}

/// Wait for one absolute orientation event
///
/// The first event decides: it must be absolute and carry `alpha`. The
/// listener is detached whether or not an event arrived.
async fn probe_absolute_orientation(host: &dyn SensorHost) -> bool {
    let Some(mut stream) = host.orientation_stream() else {
        return false;
    };

    let (sender, receiver) = oneshot::channel();
    let mut sender = Some(sender);
    stream.subscribe(
        OrientationChannel::Absolute,
        Box::new(move |reading| {
            if let Some(sender) = sender.take() {
                let _ = sender.send(reading.absolute && reading.alpha.is_some());
            }
        }),
    );

    let result = tokio::time::timeout(ORIENTATION_PROBE_TIMEOUT, receiver).await;
    stream.unsubscribe();

    matches!(result, Ok(Ok(true)))
}
