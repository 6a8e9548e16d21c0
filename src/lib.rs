//! [![github]](https://github.com/wboayue/compass-fusion)&ensp;[![crates-io]](https://crates.io/crates/compass-fusion)&ensp;[![license]](https://opensource.org/licenses/MIT)
//!
//! [github]: https://img.shields.io/badge/github-8da0cb?style=for-the-badge&labelColor=555555&logo=github
//! [crates-io]: https://img.shields.io/badge/crates.io-fc8d62?style=for-the-badge&labelColor=555555&logo=rust
//! [license]: https://img.shields.io/badge/License-MIT-blue.svg?style=for-the-badge&labelColor=555555
//!
//! Compass Fusion - A tilt-compensated digital compass
//!
//! This library turns noisy magnetometer, accelerometer and orientation
//! streams into a stable heading. It filters raw vectors, corrects for device
//! tilt, smooths the heading across north, classifies magnetic interference
//! from the field strength and converts to true north with a dipole
//! declination model. A lifecycle state machine picks the best sensors the
//! host offers and handles calibration and background transitions.
//!
//! # Features
//!
//! - Sensor waterfall: raw vectors, fused absolute orientation, vendor compass
//! - Per-axis low-pass filtering and spring-damped heading smoothing
//! - Tilt compensation from accelerometer pitch and roll
//! - Field-strength confidence and interference detection
//! - Geomagnetic declination with a session cache
//! - Bearing lock with haptic feedback and screen wake lock
//! - Async frame driver publishing snapshots over a watch channel
//!
//! # Quick Start
//!
//! ```rust
//! use compass_fusion::{AccelerometerReading, MagneticReading, SensorFusion, angular_difference};
//!
//! let mut fusion = SensorFusion::new();
//! fusion.set_real_magnetometer(true);
//!
//! // Device lying flat, field pointing east
//! fusion.update_accelerometer(&AccelerometerReading::new(0.0, 0.0, 9.81, 0.0)).unwrap();
//! fusion.update_magnetic(&MagneticReading::new(40.0, 0.0, -20.0, 0.0)).unwrap();
//!
//! let output = fusion.process().unwrap();
//! assert!(angular_difference(output.heading, 90.0).abs() < 0.1);
//! println!("heading {:.1}°, confidence {:?}", output.heading, output.confidence);
//! ```
//!
//! For a full session against a host platform see [`Compass`] and
//! [`CompassDriver`].

pub mod calibration;
pub mod compass;
mod config;
pub mod declination;
pub mod detect;
pub mod driver;
mod error;
mod filter;
mod fusion;
mod math;
pub mod orchestrator;
pub mod platform;
pub mod providers;
mod types;

// Re-export all public types and functions
pub use compass::{assess_confidence, calculate_heading, cardinal_direction};
pub use config::{CompassConfig, CompassConfigUpdate};
pub use declination::{DeclinationService, magnetic_to_true, true_to_magnetic};
pub use driver::{Command, CompassDriver, CompassHandle, Snapshot};
pub use error::{CompassError, Result};
pub use filter::{HeadingSmoother, LowPassFilter, SmoothingMode, Vector3Filter};
pub use fusion::{FusionSettings, SensorFusion};
pub use math::{
    DEG_TO_RAD, RAD_TO_DEG, Vector3Ext, angular_difference, lerp_heading, normalize_angle,
};
pub use orchestrator::Compass;
pub use platform::Platform;
pub use providers::{ReadingSink, SensorEvent, SensorProvider};
pub use types::*;
