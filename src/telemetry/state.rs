//! # Telemetry State
//!
//! The published [`TelemetrySnapshot`] plus the private accumulators that the
//! derived fields (covered distance, home vector, efficiency, flight time)
//! are computed from.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;
use super::rolling::RollingAverage;

/// Initial `timestamp` before the first heartbeat
pub const DEFAULT_TIMESTAMP: &str = "2021-01-01T00:00:00Z";

/// Initial `flightTime` before the first heartbeat
pub const DEFAULT_FLIGHT_TIME: &str = "00:00:00";

/// Format used for the `timestamp` field
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Record published to display clients
///
/// Distances are in kilometers, angles in degrees, speed in m/s,
/// altitude in meters above home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub speed: f64,
    pub altitude: f64,
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    /// First-cell voltage in volts
    pub battery: f64,
    #[serde(rename = "mAhUsed")]
    pub mah_used: f64,
    #[serde(rename = "mAhPerKm")]
    pub mah_per_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "distanceToHome")]
    pub distance_to_home: f64,
    #[serde(rename = "headingToHome")]
    pub heading_to_home: f64,
    pub timestamp: String,
    pub amps: f64,
    #[serde(rename = "coveredDistance")]
    pub covered_distance: f64,
    #[serde(rename = "flightTime")]
    pub flight_time: String,
    pub armed: bool,
    #[serde(rename = "flightMode")]
    pub flight_mode: String,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            speed: 0.0,
            altitude: 0.0,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            battery: 0.0,
            mah_used: 0.0,
            mah_per_km: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            distance_to_home: 0.0,
            heading_to_home: 0.0,
            timestamp: DEFAULT_TIMESTAMP.to_string(),
            amps: 0.0,
            covered_distance: 0.0,
            flight_time: DEFAULT_FLIGHT_TIME.to_string(),
            armed: false,
            flight_mode: String::new(),
        }
    }
}

impl TelemetrySnapshot {
    /// Current fix as a point
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Accumulators behind the derived snapshot fields. Never published.
#[derive(Debug, Clone)]
pub struct DerivedState {
    /// Write-once reference point for the home vector
    pub home_position: Option<GeoPoint>,
    /// Previous fix, `None` until the first position message
    pub last_position: Option<GeoPoint>,
    pub last_energy_used: f64,
    pub last_covered_distance: f64,
    pub last_sample_time: Instant,
    /// `None` while disarmed
    pub armed_since: Option<Instant>,
    pub efficiency_history: RollingAverage,
}

impl DerivedState {
    fn new(now: Instant) -> Self {
        Self {
            home_position: None,
            last_position: None,
            last_energy_used: 0.0,
            last_covered_distance: 0.0,
            last_sample_time: now,
            armed_since: None,
            efficiency_history: RollingAverage::default(),
        }
    }
}

/// Time source for the stateful handlers
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Monotonic instant for interval arithmetic
    fn now(&self) -> Instant;

    /// Wall-clock time for the published timestamp
    fn utc(&self) -> DateTime<Utc>;
}

/// System clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used for replay and tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Clock whose wall time begins at `utc`
    pub fn starting_at(utc: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            origin_utc: utc,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move both time bases forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn utc(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.offset())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_utc + offset
    }
}

impl Clock for Arc<ManualClock> {
    fn now(&self) -> Instant {
        self.as_ref().now()
    }

    fn utc(&self) -> DateTime<Utc> {
        self.as_ref().utc()
    }
}

/// Snapshot plus derived accumulators, mutated by the ingress handlers
pub struct TelemetryState {
    pub snapshot: TelemetrySnapshot,
    pub derived: DerivedState,
    pub(crate) clock: Box<dyn Clock>,
}

impl std::fmt::Debug for TelemetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryState")
            .field("snapshot", &self.snapshot)
            .field("derived", &self.derived)
            .finish_non_exhaustive()
    }
}

impl TelemetryState {
    /// Zero-valued state on the system clock
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            snapshot: TelemetrySnapshot::default(),
            derived: DerivedState::new(now),
            clock,
        }
    }

    /// Copy of the published record
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.clone()
    }

    pub fn home_position(&self) -> Option<GeoPoint> {
        self.derived.home_position
    }
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Render whole seconds as `H:MM:SS`, prefixed by the day count past 24 h
pub fn format_flight_time(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    match days {
        0 => format!("{}:{:02}:{:02}", hours, minutes, seconds),
        1 => format!("1 day, {}:{:02}:{:02}", hours, minutes, seconds),
        n => format!("{} days, {}:{:02}:{:02}", n, hours, minutes, seconds),
    }
}

/// Render a wall-clock instant for the `timestamp` field
pub fn format_timestamp(utc: DateTime<Utc>) -> String {
    utc.format(TIMESTAMP_FORMAT).to_string()
}
