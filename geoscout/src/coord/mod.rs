//! Coordinate math for scheduling decisions
//!
//! Provides the distance functions the controllers rely on: a planar
//! degree-space distance for short-range nearest-point selection, a
//! haversine distance in metres for route construction, and the
//! account cooldown model derived from travel distance.

mod types;

pub use types::{Coordinate, CoordError, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Mean metres per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Earth radius in metres (mean), used by the haversine distance.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Assumed travel speed for the cooldown model, in metres per second.
///
/// Tunable constant; the default encodes the observed behaviour of the
/// upstream service and is not derived from physics.
pub const COOLDOWN_SPEED_MPS: f64 = 9.8;

/// Maximum cooldown in seconds (2 hours). The encounter-time estimate is
/// clamped so the gap from "now" never exceeds this.
pub const MAX_COOLDOWN_SECS: i64 = 7200;

/// Planar distance between two coordinates in raw degree space.
///
/// Latitude and longitude are treated as Cartesian axes. This is a
/// deliberate short-range approximation used for nearest-point selection
/// inside a single work area; do not use it for real distances.
#[inline]
pub fn planar_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let dlat = a.lat - b.lat;
    let dlon = a.lon - b.lon;
    (dlat * dlat + dlon * dlon).sqrt()
}

/// Great-circle distance between two coordinates in metres (haversine).
pub fn haversine_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Cooldown in seconds implied by moving `distance_m` metres.
///
/// Linear in distance, capped at [`MAX_COOLDOWN_SECS`].
#[inline]
pub fn cooldown_secs(distance_m: f64) -> i64 {
    ((distance_m / COOLDOWN_SPEED_MPS) as i64).min(MAX_COOLDOWN_SECS)
}

/// Estimates when an account can next act at a target location.
///
/// With no prior encounter the account can act immediately. Otherwise the
/// estimate is the last encounter time plus the distance cooldown, clamped
/// so it never lies more than [`MAX_COOLDOWN_SECS`] past `now`.
pub fn estimated_encounter_time(
    last_encounter: Option<(Coordinate, DateTime<Utc>)>,
    target: &Coordinate,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match last_encounter {
        None => now,
        Some((coord, time)) => {
            let distance = haversine_meters(&coord, target);
            let estimate = time + ChronoDuration::seconds(cooldown_secs(distance));
            let ceiling = now + ChronoDuration::seconds(MAX_COOLDOWN_SECS);
            if estimate > ceiling {
                ceiling
            } else {
                estimate
            }
        }
    }
}
