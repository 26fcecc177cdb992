//! # Message Ingress
//!
//! Per-message handlers that fold decoded vehicle-link messages into the
//! [`TelemetryState`]. Each handler reports whether consumers should be woken.
//!
//! ## Notification rules
//!
//! | Message | Wakes consumers |
//! |---------|-----------------|
//! | ATTITUDE | always |
//! | VFR_HUD | only with [`NotifyPolicy::notify_on_hud`] |
//! | GLOBAL_POSITION_INT, BATTERY_STATUS, HOME_POSITION, HEARTBEAT | never |
//!
//! Attitude arrives at the fast stream rate, so every other field still
//! reaches the display within one attitude period.

use tracing::{debug, trace};

use super::geo::{great_circle_distance, initial_bearing, GeoPoint};
use super::state::{format_flight_time, format_timestamp, TelemetryState};
use crate::error::Result;
use crate::link::mode::mode_string;
use crate::link::protocol::{
    Attitude, BatteryStatus, GlobalPosition, Heartbeat, HomePosition, TelemetryMessage, VfrHud,
};

/// Which updates raise the change signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyPolicy {
    /// Also wake consumers on HUD updates
    pub notify_on_hud: bool,
}

/// Outcome of applying one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// State changed and consumers should be woken
    Notify,
    /// State may have changed but consumers are not woken
    Quiet,
}

impl Update {
    pub fn should_notify(&self) -> bool {
        matches!(self, Update::Notify)
    }
}

impl TelemetryState {
    /// Dispatch one decoded message to its handler
    ///
    /// # Errors
    ///
    /// Returns `OsdError::Decode` when the message fails validation; the
    /// state is left untouched in that case.
    pub fn apply(&mut self, message: &TelemetryMessage, policy: NotifyPolicy) -> Result<Update> {
        message.validate()?;

        let update = match message {
            TelemetryMessage::Attitude(a) => self.on_attitude(a),
            TelemetryMessage::VfrHud(h) => {
                self.on_vfr_hud(h);
                if policy.notify_on_hud {
                    Update::Notify
                } else {
                    Update::Quiet
                }
            }
            TelemetryMessage::GlobalPosition(p) => self.on_global_position(p),
            TelemetryMessage::BatteryStatus(b) => self.on_battery_status(b),
            TelemetryMessage::HomePosition(h) => self.on_home_position(h),
            TelemetryMessage::Heartbeat(hb) => self.on_heartbeat(hb),
            TelemetryMessage::CommandAck(_) => Update::Quiet,
        };
        Ok(update)
    }

    /// Store pitch and roll in degrees
    pub fn on_attitude(&mut self, attitude: &Attitude) -> Update {
        self.snapshot.pitch = (attitude.pitch as f64).to_degrees();
        self.snapshot.roll = (attitude.roll as f64).to_degrees();
        Update::Notify
    }

    /// Store ground speed and heading as reported
    pub fn on_vfr_hud(&mut self, hud: &VfrHud) {
        self.snapshot.speed = hud.groundspeed as f64;
        self.snapshot.heading = hud.heading as f64;
    }

    /// Store the fix, accumulate distance and refresh the home vector
    pub fn on_global_position(&mut self, position: &GlobalPosition) -> Update {
        self.snapshot.altitude = position.relative_alt_mm as f64 / 1000.0;
        let current = GeoPoint::from_e7(position.lat_e7, position.lon_e7);
        self.snapshot.latitude = current.lat;
        self.snapshot.longitude = current.lon;

        self.update_distance();

        if let Some(home) = self.derived.home_position {
            self.snapshot.distance_to_home = great_circle_distance(home, current);
            self.snapshot.heading_to_home = initial_bearing(current, home);
        }
        Update::Quiet
    }

    /// Store battery readings and feed the efficiency window
    pub fn on_battery_status(&mut self, battery: &BatteryStatus) -> Update {
        self.snapshot.battery = battery.first_cell_mv as f64 / 1000.0;
        self.snapshot.mah_used = battery.consumed_mah as f64;
        self.snapshot.amps = battery.current_ca as f64 / 100.0;

        self.update_efficiency();
        Update::Quiet
    }

    /// Record home on the first HOME_POSITION; later ones are ignored
    pub fn on_home_position(&mut self, home: &HomePosition) -> Update {
        if self.derived.home_position.is_none() {
            let point = GeoPoint::from_e7(home.lat_e7, home.lon_e7);
            debug!(lat = point.lat, lon = point.lon, "Home position recorded");
            self.derived.home_position = Some(point);
        } else {
            trace!("Ignoring HOME_POSITION, home already set");
        }
        Update::Quiet
    }

    /// Update armed state, flight mode, flight time and timestamp
    pub fn on_heartbeat(&mut self, heartbeat: &Heartbeat) -> Update {
        let armed = heartbeat.is_armed();
        let now = self.clock.now();

        match (armed, self.derived.armed_since) {
            (true, None) => {
                debug!("Vehicle armed");
                self.derived.armed_since = Some(now);
            }
            (false, Some(_)) => {
                debug!("Vehicle disarmed");
                self.derived.armed_since = None;
            }
            _ => {}
        }

        self.snapshot.armed = armed;
        self.snapshot.flight_mode = mode_string(heartbeat);

        let flight_secs = self
            .derived
            .armed_since
            .map(|since| now.saturating_duration_since(since).as_secs())
            .unwrap_or(0);
        self.snapshot.flight_time = format_flight_time(flight_secs);
        self.snapshot.timestamp = format_timestamp(self.clock.utc());
        Update::Quiet
    }

    /// Add the hop from the previous fix to `coveredDistance`
    ///
    /// The first fix only seeds `last_position`.
    pub fn update_distance(&mut self) {
        let current = self.snapshot.position();
        if let Some(last) = self.derived.last_position {
            self.snapshot.covered_distance += great_circle_distance(last, current);
        }
        self.derived.last_position = Some(current);
    }

    /// Append an mAh/km sample when both energy and distance grew
    ///
    /// The reference values are reset on every call with a positive time
    /// step, whether or not a sample was taken.
    pub fn update_efficiency(&mut self) {
        let now = self.clock.now();
        if now <= self.derived.last_sample_time {
            return;
        }

        let energy_diff = self.snapshot.mah_used - self.derived.last_energy_used;
        let distance_diff = self.snapshot.covered_distance - self.derived.last_covered_distance;

        if energy_diff > 0.0 && distance_diff > 0.0 {
            let sample = energy_diff / distance_diff;
            self.derived.efficiency_history.push(sample);
            self.snapshot.mah_per_km = self.derived.efficiency_history.mean();
            trace!(sample, mean = self.snapshot.mah_per_km, "Efficiency sample");
        }

        self.derived.last_energy_used = self.snapshot.mah_used;
        self.derived.last_covered_distance = self.snapshot.covered_distance;
        self.derived.last_sample_time = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OsdError;
    use crate::link::protocol::{CommandAck, MAV_MODE_FLAG_CUSTOM_MODE_ENABLED};
    use crate::telemetry::geo::great_circle_distance;
    use crate::telemetry::state::ManualClock;
    use std::f32::consts::FRAC_PI_4;
    use std::sync::Arc;
    use std::time::Duration;

    fn state_with_clock() -> (TelemetryState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let state = TelemetryState::with_clock(Box::new(clock.clone()));
        (state, clock)
    }

    fn position(lat: f64, lon: f64) -> GlobalPosition {
        GlobalPosition {
            relative_alt_mm: 12_500,
            lat_e7: (lat * 1e7).round() as i32,
            lon_e7: (lon * 1e7).round() as i32,
        }
    }

    fn heartbeat(armed: bool) -> Heartbeat {
        let armed_bit = if armed { 0x80 } else { 0x00 };
        Heartbeat {
            base_mode: armed_bit | MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            custom_mode: 5,
            vehicle_type: 1,
            autopilot: 3,
        }
    }

    #[test]
    fn test_attitude_converts_to_degrees_and_notifies() {
        let (mut state, _) = state_with_clock();
        let update = state.on_attitude(&Attitude {
            pitch: FRAC_PI_4,
            roll: -FRAC_PI_4,
        });

        assert_eq!(update, Update::Notify);
        assert!((state.snapshot.pitch - 45.0).abs() < 1e-3);
        assert!((state.snapshot.roll + 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_hud_is_quiet_by_default() {
        let (mut state, _) = state_with_clock();
        let msg = TelemetryMessage::VfrHud(VfrHud {
            groundspeed: 17.5,
            heading: 270,
        });

        let update = state.apply(&msg, NotifyPolicy::default()).unwrap();
        assert_eq!(update, Update::Quiet);
        assert_eq!(state.snapshot.speed, 17.5);
        assert_eq!(state.snapshot.heading, 270.0);
    }

    #[test]
    fn test_hud_notifies_when_opted_in() {
        let (mut state, _) = state_with_clock();
        let msg = TelemetryMessage::VfrHud(VfrHud {
            groundspeed: 3.0,
            heading: 10,
        });
        let policy = NotifyPolicy { notify_on_hud: true };

        assert!(state.apply(&msg, policy).unwrap().should_notify());
    }

    #[test]
    fn test_position_unit_conversion() {
        let (mut state, _) = state_with_clock();
        state.on_global_position(&GlobalPosition {
            relative_alt_mm: 120_500,
            lat_e7: 525_000_000,
            lon_e7: -15_000_000,
        });

        assert!((state.snapshot.altitude - 120.5).abs() < 1e-9);
        assert!((state.snapshot.latitude - 52.5).abs() < 1e-9);
        assert!((state.snapshot.longitude + 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_first_fix_only_seeds_last_position() {
        let (mut state, _) = state_with_clock();
        state.on_global_position(&position(10.0, 10.0));

        assert_eq!(state.snapshot.covered_distance, 0.0);
        assert!(state.derived.last_position.is_some());
    }

    #[test]
    fn test_covered_distance_is_sum_of_hops() {
        let (mut state, _) = state_with_clock();
        let track = [
            (0.0, 0.0),
            (0.0, 0.01),
            (0.01, 0.01),
            (0.01, 0.01),
            (0.02, 0.0),
            (0.0, 0.0),
        ];

        let mut expected = 0.0;
        let mut previous_total = 0.0;
        for (i, &(lat, lon)) in track.iter().enumerate() {
            state.on_global_position(&position(lat, lon));
            if i > 0 {
                let (plat, plon) = track[i - 1];
                expected += great_circle_distance(GeoPoint::new(plat, plon), GeoPoint::new(lat, lon));
            }
            assert!(state.snapshot.covered_distance >= previous_total);
            previous_total = state.snapshot.covered_distance;
        }

        assert!((state.snapshot.covered_distance - expected).abs() < 1e-6);
    }

    #[test]
    fn test_home_vector_needs_home() {
        let (mut state, _) = state_with_clock();
        state.on_global_position(&position(0.0, 1.0));
        assert_eq!(state.snapshot.distance_to_home, 0.0);
        assert_eq!(state.snapshot.heading_to_home, 0.0);

        state.on_home_position(&HomePosition { lat_e7: 0, lon_e7: 0 });
        state.on_global_position(&position(0.0, 1.0));

        assert!((state.snapshot.distance_to_home - 111.19).abs() < 0.5);
        // Home lies due west of the vehicle
        assert!((state.snapshot.heading_to_home - 270.0).abs() < 1e-3);
    }

    #[test]
    fn test_home_position_is_write_once() {
        let (mut state, _) = state_with_clock();
        state.on_home_position(&HomePosition {
            lat_e7: 100_000_000,
            lon_e7: 200_000_000,
        });
        state.on_home_position(&HomePosition {
            lat_e7: -300_000_000,
            lon_e7: 50_000_000,
        });

        let home = state.home_position().unwrap();
        assert!((home.lat - 10.0).abs() < 1e-9);
        assert!((home.lon - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_battery_unit_conversion() {
        let (mut state, _) = state_with_clock();
        state.on_battery_status(&BatteryStatus {
            first_cell_mv: 16_350,
            consumed_mah: 420,
            current_ca: 1_234,
        });

        assert!((state.snapshot.battery - 16.35).abs() < 1e-9);
        assert_eq!(state.snapshot.mah_used, 420.0);
        assert!((state.snapshot.amps - 12.34).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_from_energy_and_distance() {
        let (mut state, clock) = state_with_clock();

        clock.advance(Duration::from_secs(1));
        state.update_efficiency();
        assert!(state.derived.efficiency_history.is_empty());

        state.snapshot.mah_used = 10.0;
        state.snapshot.covered_distance = 1.0;
        clock.advance(Duration::from_secs(1));
        state.update_efficiency();

        assert_eq!(state.derived.efficiency_history.len(), 1);
        assert!((state.snapshot.mah_per_km - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_skips_samples_without_progress() {
        let (mut state, clock) = state_with_clock();

        // energy used while hovering in place
        state.snapshot.mah_used = 50.0;
        clock.advance(Duration::from_secs(1));
        state.update_efficiency();

        assert!(state.derived.efficiency_history.is_empty());
        assert_eq!(state.snapshot.mah_per_km, 0.0);
        // reference values still move forward
        assert_eq!(state.derived.last_energy_used, 50.0);
    }

    #[test]
    fn test_efficiency_needs_positive_time_step() {
        let (mut state, _clock) = state_with_clock();
        state.snapshot.mah_used = 10.0;
        state.snapshot.covered_distance = 1.0;

        state.update_efficiency();

        assert!(state.derived.efficiency_history.is_empty());
        assert_eq!(state.derived.last_energy_used, 0.0);
    }

    #[test]
    fn test_efficiency_window_is_bounded() {
        let (mut state, clock) = state_with_clock();
        for i in 1..=25 {
            state.snapshot.mah_used += i as f64;
            state.snapshot.covered_distance += 1.0;
            clock.advance(Duration::from_millis(100));
            state.update_efficiency();
        }

        assert_eq!(state.derived.efficiency_history.len(), 20);
        // samples 6..=25 remain
        assert!((state.snapshot.mah_per_km - 15.5).abs() < 1e-9);
    }

    #[test]
    fn test_armed_edge_starts_and_stops_flight_time() {
        let (mut state, clock) = state_with_clock();

        state.on_heartbeat(&heartbeat(true));
        assert!(state.snapshot.armed);
        assert_eq!(state.snapshot.flight_time, "0:00:00");

        clock.advance(Duration::from_secs(75));
        state.on_heartbeat(&heartbeat(true));
        assert_eq!(state.snapshot.flight_time, "0:01:15");

        clock.advance(Duration::from_secs(5));
        state.on_heartbeat(&heartbeat(false));
        assert!(!state.snapshot.armed);
        assert!(state.derived.armed_since.is_none());
        assert_eq!(state.snapshot.flight_time, "0:00:00");

        clock.advance(Duration::from_secs(30));
        state.on_heartbeat(&heartbeat(true));
        assert_eq!(state.snapshot.flight_time, "0:00:00");
    }

    #[test]
    fn test_heartbeat_sets_mode_and_timestamp() {
        use chrono::TimeZone;

        let start = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 8, 15, 0).unwrap();
        let clock = Arc::new(ManualClock::starting_at(start));
        let mut state = TelemetryState::with_clock(Box::new(clock.clone()));

        clock.advance(Duration::from_secs(2));
        state.on_heartbeat(&heartbeat(false));

        assert_eq!(state.snapshot.flight_mode, "FBWA");
        assert_eq!(state.snapshot.timestamp, "2024-03-09T08:15:02Z");
    }

    #[test]
    fn test_invalid_message_leaves_state_untouched() {
        let (mut state, _) = state_with_clock();
        let before = state.snapshot();
        let msg = TelemetryMessage::Attitude(Attitude {
            pitch: f32::INFINITY,
            roll: 0.0,
        });

        let result = state.apply(&msg, NotifyPolicy::default());
        assert!(matches!(result, Err(OsdError::Decode(_))));
        assert_eq!(state.snapshot, before);
    }

    #[test]
    fn test_command_ack_is_noop() {
        let (mut state, _) = state_with_clock();
        let before = state.snapshot();
        let msg = TelemetryMessage::CommandAck(CommandAck {
            command: 511,
            result: 0,
        });

        assert_eq!(state.apply(&msg, NotifyPolicy::default()).unwrap(), Update::Quiet);
        assert_eq!(state.snapshot, before);
    }
}
