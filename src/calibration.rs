//! Calibration progress
//!
//! Calibration advances on a fixed schedule rather than on measured sensor
//! coverage: 10 % every 200 ms, complete after two seconds of foreground
//! time.

use std::time::Duration;

use tokio::time::Instant;

/// Progress gained per step, in percent
pub const CALIBRATION_STEP: u8 = 10;
/// Time between steps
pub const CALIBRATION_INTERVAL: Duration = Duration::from_millis(200);

const COMPLETE: u8 = 100;

/// Fixed-rate calibration progress tracker
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tokio::time::Instant;
/// use compass_fusion::calibration::CalibrationSchedule;
///
/// let start = Instant::now();
/// let mut schedule = CalibrationSchedule::default();
/// schedule.begin(start);
///
/// schedule.advance(start + Duration::from_millis(450));
/// assert_eq!(schedule.progress(), 20);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationSchedule {
    progress: u8,
    last_step: Option<Instant>,
}

impl CalibrationSchedule {
    /// Restart from zero at `now`
    pub fn begin(&mut self, now: Instant) {
        self.progress = 0;
        self.last_step = Some(now);
    }

    /// Apply every step elapsed since the last one
    ///
    /// # Returns
    /// `true` when this call completed the calibration
    pub fn advance(&mut self, now: Instant) -> bool {
        let Some(mut last_step) = self.last_step else {
            return false;
        };
        if self.is_complete() {
            return false;
        }

        while self.progress < COMPLETE && now.duration_since(last_step) >= CALIBRATION_INTERVAL {
            self.progress = (self.progress + CALIBRATION_STEP).min(COMPLETE);
            last_step += CALIBRATION_INTERVAL;
        }
        self.last_step = Some(last_step);

        self.is_complete()
    }

    /// Shift the schedule so time spent paused does not count
    pub fn rebase(&mut self, paused_at: Instant, now: Instant) {
        if let Some(last_step) = self.last_step.as_mut() {
            *last_step += now.saturating_duration_since(paused_at);
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_running(&self) -> bool {
        self.last_step.is_some() && !self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= COMPLETE
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
