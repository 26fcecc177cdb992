//! # Flight Mode Names
//!
//! Turns a heartbeat's `base_mode`/`custom_mode` pair into the short mode
//! string shown on the display. ArduPilot reports its modes through
//! `custom_mode`, whose meaning depends on the vehicle type.

use super::protocol::{Heartbeat, MAV_MODE_FLAG_CUSTOM_MODE_ENABLED};

/// ArduPlane custom modes
const PLANE_MODES: &[(u32, &str)] = &[
    (0, "MANUAL"),
    (1, "CIRCLE"),
    (2, "STABILIZE"),
    (3, "TRAINING"),
    (4, "ACRO"),
    (5, "FBWA"),
    (6, "FBWB"),
    (7, "CRUISE"),
    (8, "AUTOTUNE"),
    (10, "AUTO"),
    (11, "RTL"),
    (12, "LOITER"),
    (13, "TAKEOFF"),
    (14, "AVOID_ADSB"),
    (15, "GUIDED"),
    (16, "INITIALISING"),
    (17, "QSTABILIZE"),
    (18, "QHOVER"),
    (19, "QLOITER"),
    (20, "QLAND"),
    (21, "QRTL"),
    (22, "QAUTOTUNE"),
    (23, "QACRO"),
    (24, "THERMAL"),
    (25, "LOITERALTQLAND"),
];

/// ArduCopter custom modes
const COPTER_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (9, "LAND"),
    (11, "DRIFT"),
    (13, "SPORT"),
    (14, "FLIP"),
    (15, "AUTOTUNE"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (18, "THROW"),
    (19, "AVOID_ADSB"),
    (20, "GUIDED_NOGPS"),
    (21, "SMART_RTL"),
    (22, "FLOWHOLD"),
    (23, "FOLLOW"),
    (24, "ZIGZAG"),
    (25, "SYSTEMID"),
    (26, "AUTOROTATE"),
    (27, "AUTO_RTL"),
];

/// Rover and boat custom modes
const ROVER_MODES: &[(u32, &str)] = &[
    (0, "MANUAL"),
    (1, "ACRO"),
    (3, "STEERING"),
    (4, "HOLD"),
    (5, "LOITER"),
    (6, "FOLLOW"),
    (7, "SIMPLE"),
    (10, "AUTO"),
    (11, "RTL"),
    (12, "SMART_RTL"),
    (15, "GUIDED"),
    (16, "INITIALISING"),
];

/// Mode table for a MAV_TYPE, if we know one
fn mode_table(vehicle_type: u8) -> Option<&'static [(u32, &'static str)]> {
    match vehicle_type {
        // FIXED_WING and the VTOL family run ArduPlane
        1 | 19..=25 => Some(PLANE_MODES),
        // QUADROTOR, COAXIAL, HELICOPTER, HEXAROTOR, OCTOROTOR, TRICOPTER, DODECAROTOR
        2 | 3 | 4 | 13 | 14 | 15 | 29 => Some(COPTER_MODES),
        // GROUND_ROVER, SURFACE_BOAT
        10 | 11 => Some(ROVER_MODES),
        _ => None,
    }
}

/// Decode the flight mode string for a heartbeat
///
/// # Returns
///
/// * `String` - Mode name such as `"FBWA"`, or `Mode(0xNN)` when the custom
///   mode flag is clear, or `Mode(N)` for an unknown custom mode
///
/// # Examples
///
/// ```
/// use osd_telemetry::link::mode::mode_string;
/// use osd_telemetry::link::protocol::Heartbeat;
///
/// let hb = Heartbeat { base_mode: 0x81, custom_mode: 5, vehicle_type: 1, autopilot: 3 };
/// assert_eq!(mode_string(&hb), "FBWA");
/// ```
pub fn mode_string(heartbeat: &Heartbeat) -> String {
    if heartbeat.base_mode & MAV_MODE_FLAG_CUSTOM_MODE_ENABLED == 0 {
        return format!("Mode(0x{:08x})", heartbeat.base_mode);
    }

    mode_table(heartbeat.vehicle_type)
        .and_then(|table| {
            table
                .iter()
                .find(|(id, _)| *id == heartbeat.custom_mode)
                .map(|(_, name)| name.to_string())
        })
        .unwrap_or_else(|| format!("Mode({})", heartbeat.custom_mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(vehicle_type: u8, custom_mode: u32) -> Heartbeat {
        Heartbeat {
            base_mode: MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            custom_mode,
            vehicle_type,
            autopilot: 3,
        }
    }

    #[test]
    fn test_plane_modes() {
        assert_eq!(mode_string(&heartbeat(1, 0)), "MANUAL");
        assert_eq!(mode_string(&heartbeat(1, 11)), "RTL");
        assert_eq!(mode_string(&heartbeat(20, 19)), "QLOITER");
    }

    #[test]
    fn test_copter_modes() {
        assert_eq!(mode_string(&heartbeat(2, 5)), "LOITER");
        assert_eq!(mode_string(&heartbeat(13, 16)), "POSHOLD");
    }

    #[test]
    fn test_rover_modes() {
        assert_eq!(mode_string(&heartbeat(10, 4)), "HOLD");
    }

    #[test]
    fn test_unknown_custom_mode() {
        assert_eq!(mode_string(&heartbeat(1, 99)), "Mode(99)");
        assert_eq!(mode_string(&heartbeat(42, 3)), "Mode(3)");
    }

    #[test]
    fn test_custom_mode_flag_clear() {
        let hb = Heartbeat {
            base_mode: 0x80,
            custom_mode: 5,
            vehicle_type: 1,
            autopilot: 3,
        };
        assert_eq!(mode_string(&hb), "Mode(0x00000080)");
    }
}
