//! Runs a compass session against a simulated device
//!
//! The device turns slowly clockwise on a table. Halfway through a magnet is
//! held next to it for a second, then the app is briefly hidden.
//!
//! ```text
//! RUST_LOG=compass_fusion=debug cargo run --example simulated
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use compass_fusion::platform::{
    GeolocationRequest, Geolocator, OrientationStream, Position, SensorHost, SensorSignal,
    VectorListener, VectorSample, VectorSensor, Vibrator,
};
use compass_fusion::{Compass, CompassDriver, Platform, Result, cardinal_direction};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

const TURN_RATE: f32 = 20.0; // degrees per second
const HORIZONTAL_FIELD: f32 = 20.0; // µT
const VERTICAL_FIELD: f32 = -44.0; // µT

#[derive(Clone, Copy)]
enum Axis {
    Magnetic,
    Gravity,
}

struct Device {
    started: Instant,
    magnet_nearby: bool,
}

impl Device {
    fn sample(&self, axis: Axis) -> VectorSample {
        let elapsed = self.started.elapsed().as_secs_f32();
        let timestamp = f64::from(elapsed) * 1000.0;

        let (x, y, z) = match axis {
            Axis::Gravity => (0.0, 0.0, 9.81),
            Axis::Magnetic => {
                let (sin, cos) = (elapsed * TURN_RATE).to_radians().sin_cos();
                let boost = if self.magnet_nearby { 4.0 } else { 1.0 };
                (
                    sin * HORIZONTAL_FIELD * boost,
                    cos * HORIZONTAL_FIELD * boost,
                    VERTICAL_FIELD * boost,
                )
            }
        };

        VectorSample { x, y, z, timestamp }
    }
}

struct SimulatedSensor {
    axis: Axis,
    frequency: f32,
    device: Arc<Mutex<Device>>,
    task: Option<JoinHandle<()>>,
}

impl VectorSensor for SimulatedSensor {
    fn start(&mut self, mut listener: VectorListener) -> Result<()> {
        let axis = self.axis;
        let device = self.device.clone();
        let period = Duration::from_secs_f32(1.0 / self.frequency);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let sample = device.lock().sample(axis);
                listener(SensorSignal::Reading(sample));
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SimulatedHost {
    device: Arc<Mutex<Device>>,
}

impl SimulatedHost {
    fn sensor(&self, axis: Axis, frequency: f32) -> Box<dyn VectorSensor> {
        Box::new(SimulatedSensor {
            axis,
            frequency,
            device: self.device.clone(),
            task: None,
        })
    }
}

#[async_trait]
impl SensorHost for SimulatedHost {
    fn magnetometer(&self, frequency: f32) -> Result<Box<dyn VectorSensor>> {
        Ok(self.sensor(Axis::Magnetic, frequency))
    }

    fn accelerometer(&self, frequency: f32) -> Result<Box<dyn VectorSensor>> {
        Ok(self.sensor(Axis::Gravity, frequency))
    }

    fn has_gyroscope(&self) -> bool {
        false
    }

    fn has_orientation_events(&self) -> bool {
        false
    }

    fn has_absolute_orientation_events(&self) -> bool {
        false
    }

    fn orientation_stream(&self) -> Option<Box<dyn OrientationStream>> {
        None
    }

    fn requires_permission(&self) -> bool {
        false
    }

    async fn request_permission(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Always reports Greenwich
struct FixedLocation;

#[async_trait]
impl Geolocator for FixedLocation {
    async fn current_position(&self, _request: GeolocationRequest) -> Result<Position> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(Position {
            latitude: 51.4769,
            longitude: -0.0005,
            altitude: Some(46.0),
            accuracy: Some(25.0),
        })
    }
}

struct ConsoleVibrator;

impl Vibrator for ConsoleVibrator {
    fn is_supported(&self) -> bool {
        true
    }

    fn vibrate(&self, pattern: &[u32]) -> bool {
        info!(?pattern, "bzzt");
        true
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let device = Arc::new(Mutex::new(Device {
        started: Instant::now(),
        magnet_nearby: false,
    }));

    let platform = Platform::new(Arc::new(SimulatedHost {
        device: device.clone(),
    }))
    .with_geolocator(Arc::new(FixedLocation))
    .with_vibrator(Arc::new(ConsoleVibrator));

    let (handle, driver) = CompassDriver::new(Compass::new(platform));
    let driver = tokio::spawn(driver.run());

    // Print a line every time the rounded heading or the state changes
    let mut snapshots = handle.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = None;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let Some(data) = snapshot.data else { continue };

            let key = (data.heading.round() as i32, snapshot.state);
            if last == Some(key) {
                continue;
            }
            last = Some(key);

            println!(
                "{:>5.1}° {:<2} {:<16} field {:>5.1} µT  calibration {:>3}%{}",
                data.heading,
                cardinal_direction(data.heading),
                snapshot.state.to_string(),
                data.field_strength.unwrap_or_default(),
                snapshot.calibration_progress,
                snapshot
                    .lock
                    .map(|lock| format!("  off target {:.1}°", lock.deviation))
                    .unwrap_or_default(),
            );
        }
    });

    handle.start().await?;
    handle.set_target_bearing(Some(90.0)).await?;
    tokio::time::sleep(Duration::from_secs(4)).await;

    info!("holding a magnet next to the device");
    device.lock().magnet_nearby = true;
    tokio::time::sleep(Duration::from_secs(1)).await;
    device.lock().magnet_nearby = false;
    tokio::time::sleep(Duration::from_secs(1)).await;

    info!("app hidden");
    handle.set_visible(false).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!("app visible again");
    handle.set_visible(true).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    handle.stop().await?;
    drop(handle);

    let compass = driver.await?;
    printer.await?;
    info!(state = %compass.state(), "session finished");
    Ok(())
}
