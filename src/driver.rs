//! Frame scheduler
//!
//! [`CompassDriver`] owns a [`Compass`] on one task, runs its frame loop at
//! roughly 60 Hz while it is active and applies commands sent through a
//! [`CompassHandle`]. Every change is published as a [`Snapshot`] on a watch
//! channel, so readers always see the latest frame and never a backlog.
//! A wake-lock request is awaited alongside the frames, never in place of
//! them.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::CompassConfigUpdate;
use crate::error::{CompassError, Result};
use crate::orchestrator::{Compass, WakeLockRequest};
use crate::platform::WakeLockSentinel;
use crate::types::{CompassData, CompassState, LockStatus, ProviderKind};

/// Frame period, about 60 frames per second
pub const FRAME_PERIOD: Duration = Duration::from_micros(16_667);

const COMMAND_BUFFER: usize = 32;

/// Imperative compass operations
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    RequestCalibration,
    SetTargetBearing(Option<f32>),
    ToggleWakeLock,
    UpdateConfig(CompassConfigUpdate),
    SetVisible(bool),
}

/// Everything a UI needs to render one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: CompassState,
    pub data: Option<CompassData>,
    pub lock: Option<LockStatus>,
    pub calibration_progress: u8,
    pub wake_lock_active: bool,
    pub provider: ProviderKind,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn capture(compass: &Compass) -> Self {
        Self {
            state: compass.state(),
            data: compass.data(),
            lock: compass.lock_status(),
            calibration_progress: compass.calibration_progress(),
            wake_lock_active: compass.wake_lock_active(),
            provider: compass.provider_kind(),
            error: compass.last_error().map(ToString::to_string),
        }
    }
}

/// Cloneable control surface for a running [`CompassDriver`]
#[derive(Debug, Clone)]
pub struct CompassHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl CompassHandle {
    /// Queue a command; fails once the driver has exited
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CompassError::DriverStopped)
    }

    pub async fn start(&self) -> Result<()> {
        self.send(Command::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    pub async fn request_calibration(&self) -> Result<()> {
        self.send(Command::RequestCalibration).await
    }

    pub async fn set_target_bearing(&self, bearing: Option<f32>) -> Result<()> {
        self.send(Command::SetTargetBearing(bearing)).await
    }

    pub async fn toggle_wake_lock(&self) -> Result<()> {
        self.send(Command::ToggleWakeLock).await
    }

    pub async fn update_config(&self, update: CompassConfigUpdate) -> Result<()> {
        self.send(Command::UpdateConfig(update)).await
    }

    pub async fn set_visible(&self, visible: bool) -> Result<()> {
        self.send(Command::SetVisible(visible)).await
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Independent receiver for change notifications
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

/// Runs a [`Compass`] until every [`CompassHandle`] is dropped
pub struct CompassDriver {
    compass: Compass,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Snapshot>,
    wake_lock_request: Option<WakeLockRequest>,
}

impl CompassDriver {
    pub fn new(compass: Compass) -> (CompassHandle, Self) {
        let (command_sender, commands) = mpsc::channel(COMMAND_BUFFER);
        let (snapshots, snapshot_receiver) = watch::channel(Snapshot::capture(&compass));

        let handle = CompassHandle {
            commands: command_sender,
            snapshots: snapshot_receiver,
        };
        let driver = Self {
            compass,
            commands,
            snapshots,
            wake_lock_request: None,
        };
        (handle, driver)
    }

    /// Drive the compass; returns it, shut down, once the handles are gone
    pub async fn run(mut self) -> Compass {
        let mut frames = tokio::time::interval(FRAME_PERIOD);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.execute(command).await,
                    None => break,
                },
                now = frames.tick(), if self.compass.is_frame_loop_running() => {
                    self.compass.tick(now);
                }
                granted = wake_lock_granted(&mut self.wake_lock_request),
                    if self.wake_lock_request.is_some() =>
                {
                    self.wake_lock_request = None;
                    if let Err(err) = self.compass.finish_wake_lock_toggle(granted) {
                        debug!(%err, "wake lock request failed");
                    }
                }
            }
            self.publish();
        }

        info!("all compass handles dropped, shutting down");
        self.compass.shutdown();
        self.publish();
        self.compass
    }

    async fn execute(&mut self, command: Command) {
        debug!(?command, "compass command");

        let result = match command {
            Command::Start => self.compass.start().await,
            Command::Stop => {
                self.compass.stop();
                Ok(())
            }
            Command::RequestCalibration => {
                self.compass.request_calibration(Instant::now());
                Ok(())
            }
            Command::SetTargetBearing(bearing) => self.compass.set_target_bearing(bearing),
            Command::ToggleWakeLock if self.wake_lock_request.is_some() => {
                debug!("wake lock request already pending");
                Ok(())
            }
            Command::ToggleWakeLock => self
                .compass
                .begin_wake_lock_toggle()
                .map(|request| self.wake_lock_request = request),
            Command::UpdateConfig(update) => self.compass.update_config(update),
            Command::SetVisible(visible) => {
                self.compass.set_visible(visible, Instant::now()).await
            }
        };

        if let Err(err) = result {
            // Errors the compass recorded itself are already logged
            if self.compass.last_error() == Some(&err) {
                debug!(%err, "compass command failed");
            } else {
                warn!(%err, "compass command rejected");
            }
        }
    }

    fn publish(&self) {
        let snapshot = Snapshot::capture(&self.compass);
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn wake_lock_granted(
    request: &mut Option<WakeLockRequest>,
) -> Result<Box<dyn WakeLockSentinel>> {
    match request {
        Some(request) => request.await,
        None => std::future::pending().await,
    }
}
