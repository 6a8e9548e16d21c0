//! Geomagnetic declination
//!
//! Approximates the angle between true and magnetic north with a single
//! tilted dipole. Expect errors of a degree or two in most populated areas and
//! considerably more near the magnetic poles.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::math::normalize_angle;
use crate::platform::{GeolocationRequest, Geolocator};
use crate::types::DeclinationData;

/// Approximate magnetic north pole latitude in degrees
const POLE_LATITUDE: f64 = 86.5;
/// Approximate magnetic north pole longitude in degrees (west is negative)
const POLE_LONGITUDE: f64 = -164.0;
/// Annual drift in degrees per year
const SECULAR_VARIATION: f64 = 0.08;
const EPOCH_YEAR: i32 = 2020;

const BASE_ACCURACY: f32 = 1.5;
const MAX_ACCURACY: f32 = 10.0;
const METERS_PER_DEGREE: f64 = 111_000.0;
/// Assumed position accuracy when the host reports none
const DEFAULT_POSITION_ACCURACY: f64 = 1_000.0;

/// Declination at a location and date
///
/// # Arguments
/// * `latitude` - Geographic latitude in degrees, `-90..=90`
/// * `longitude` - Geographic longitude in degrees, `-180..=180`
/// * `altitude` - Meters above sea level
/// * `date` - Date used for the secular variation term
///
/// # Returns
/// Degrees, positive east and negative west
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use compass_fusion::declination::calculate_declination;
///
/// // Due south of the modelled pole the bearing to it is zero
/// let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
/// let declination = calculate_declination(40.0, -164.0, 0.0, epoch);
/// assert!(declination.abs() < 1e-4);
/// ```
pub fn calculate_declination(
    latitude: f64,
    longitude: f64,
    altitude: f64,
    date: DateTime<Utc>,
) -> f32 {
    let lat = latitude.to_radians();
    let pole_lat = POLE_LATITUDE.to_radians();
    let delta_lon = (POLE_LONGITUDE - longitude).to_radians();

    // Initial great-circle bearing from the location to the pole
    let y = delta_lon.sin() * pole_lat.cos();
    let x = lat.cos() * pole_lat.sin() - lat.sin() * pole_lat.cos() * delta_lon.cos();
    let mut declination = y.atan2(x).to_degrees();

    if declination > 180.0 {
        declination -= 360.0;
    } else if declination < -180.0 {
        declination += 360.0;
    }

    let years = f64::from(date.year() - EPOCH_YEAR) + f64::from(date.month0()) / 12.0;
    declination += years * SECULAR_VARIATION;

    let altitude_km = altitude / 1000.0;
    declination *= 1.0 - 0.01 * altitude_km;

    declination as f32
}

/// Rough accuracy of [`calculate_declination`] in degrees
///
/// Degrades beyond 60° of latitude and with a coarse position fix; never
/// worse than 10°.
pub fn estimate_accuracy(latitude: f64, position_accuracy: f64) -> f32 {
    let mut accuracy = f64::from(BASE_ACCURACY);

    let abs_lat = latitude.abs();
    if abs_lat > 60.0 {
        accuracy += (abs_lat - 60.0) * 0.1;
    }
    accuracy += position_accuracy / METERS_PER_DEGREE * 0.5;

    (accuracy as f32).min(MAX_ACCURACY)
}

/// Convert a magnetic heading to a true heading
pub fn magnetic_to_true(magnetic_heading: f32, declination: f32) -> f32 {
    normalize_angle(magnetic_heading + declination)
}

/// Convert a true heading to a magnetic heading
pub fn true_to_magnetic(true_heading: f32, declination: f32) -> f32 {
    normalize_angle(true_heading - declination)
}

/// Human-readable declination, e.g. `"5.2° E"` or `"12.8° W"`
pub fn format_declination(declination: f32) -> String {
    let direction = if declination >= 0.0 { 'E' } else { 'W' };
    format!("{:.1}° {}", declination.abs(), direction)
}

/// Resolves declination from the host position, once per session
///
/// Clones share one cache, so a result obtained by a background task is
/// visible to every holder until [`DeclinationService::clear`].
#[derive(Clone)]
pub struct DeclinationService {
    geolocator: Option<Arc<dyn Geolocator>>,
    cache: Arc<Mutex<Option<DeclinationData>>>,
}

impl DeclinationService {
    pub fn new(geolocator: Option<Arc<dyn Geolocator>>) -> Self {
        Self {
            geolocator,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.geolocator.is_some()
    }

    /// Cached declination, or one coarse position request
    ///
    /// Geolocation errors, timeouts and missing support are logged and
    /// yield `None`; the compass then stays on magnetic north.
    pub async fn get_declination(&self) -> Option<DeclinationData> {
        if let Some(cached) = self.cached() {
            return Some(cached);
        }

        let Some(geolocator) = &self.geolocator else {
            warn!("geolocation not supported, true north unavailable");
            return None;
        };

        let request = GeolocationRequest::default();
        let position =
            match tokio::time::timeout(request.timeout, geolocator.current_position(request))
                .await
            {
                Ok(Ok(position)) => position,
                Ok(Err(err)) => {
                    warn!(%err, "geolocation error");
                    return None;
                }
                Err(_) => {
                    warn!(timeout = ?request.timeout, "geolocation timed out");
                    return None;
                }
            };

        let now = Utc::now();
        let data = DeclinationData {
            declination: calculate_declination(
                position.latitude,
                position.longitude,
                position.altitude.unwrap_or(0.0),
                now,
            ),
            latitude: position.latitude,
            longitude: position.longitude,
            accuracy: estimate_accuracy(
                position.latitude,
                position.accuracy.unwrap_or(DEFAULT_POSITION_ACCURACY),
            ),
            timestamp: now,
        };
        debug!(
            declination = data.declination,
            accuracy = data.accuracy,
            "declination resolved"
        );

        *self.cache.lock() = Some(data);
        Some(data)
    }

    pub fn cached(&self) -> Option<DeclinationData> {
        *self.cache.lock()
    }

    /// Forget the cached value, e.g. after moving far
    pub fn clear(&self) {
        *self.cache.lock() = None;
    }
}

impl core::fmt::Debug for DeclinationService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeclinationService")
            .field("supported", &self.is_supported())
            .field("cached", &self.cached())
            .finish()
    }
}
