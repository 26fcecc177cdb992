//! # Vehicle-Link Protocol Types
//!
//! MAVLink message ids and flags the aggregator cares about, and the decoded
//! [`TelemetryMessage`] the ingress handlers consume. Keeping our own types
//! here decouples the business logic from the `mavlink` crate's generated
//! structs.

use crate::error::{OsdError, Result};

/// MAVLink v1 start-of-frame marker
pub const MAV_STX_V1: u8 = 0xFE;

/// HEARTBEAT message id
pub const MSG_ID_HEARTBEAT: u32 = 0;

/// ATTITUDE message id
pub const MSG_ID_ATTITUDE: u32 = 30;

/// GLOBAL_POSITION_INT message id
pub const MSG_ID_GLOBAL_POSITION_INT: u32 = 33;

/// COMMAND_ACK message id
pub const MSG_ID_COMMAND_ACK: u32 = 77;

/// VFR_HUD message id
pub const MSG_ID_VFR_HUD: u32 = 74;

/// BATTERY_STATUS message id
pub const MSG_ID_BATTERY_STATUS: u32 = 147;

/// HOME_POSITION message id
pub const MSG_ID_HOME_POSITION: u32 = 242;

/// MAV_CMD_SET_MESSAGE_INTERVAL command id
pub const MAV_CMD_SET_MESSAGE_INTERVAL: u16 = 511;

/// base_mode bit: vehicle is armed
pub const MAV_MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

/// base_mode bit: custom_mode carries the autopilot-specific mode
pub const MAV_MODE_FLAG_CUSTOM_MODE_ENABLED: u8 = 0x01;

/// Battery voltage value meaning "cell not present / unknown"
pub const VOLTAGE_UNKNOWN_MV: u16 = u16::MAX;

/// Attitude stream sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    /// Pitch in radians
    pub pitch: f32,
    /// Roll in radians
    pub roll: f32,
}

/// HUD stream sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VfrHud {
    /// Ground speed in m/s
    pub groundspeed: f32,
    /// Heading in degrees (0-359)
    pub heading: i16,
}

/// Fused global position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalPosition {
    /// Altitude above home in millimeters
    pub relative_alt_mm: i32,
    /// Latitude in degrees × 10^7
    pub lat_e7: i32,
    /// Longitude in degrees × 10^7
    pub lon_e7: i32,
}

/// Battery status sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStatus {
    /// First cell (or pack) voltage in millivolts
    pub first_cell_mv: u16,
    /// Consumed charge in mAh
    pub consumed_mah: i32,
    /// Current draw in centiamps
    pub current_ca: i16,
}

/// Home position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomePosition {
    pub lat_e7: i32,
    pub lon_e7: i32,
}

/// Heartbeat status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub base_mode: u8,
    pub custom_mode: u32,
    /// MAV_TYPE of the sender
    pub vehicle_type: u8,
    /// MAV_AUTOPILOT of the sender
    pub autopilot: u8,
}

impl Heartbeat {
    /// Safety-armed bit of `base_mode`
    pub fn is_armed(&self) -> bool {
        self.base_mode & MAV_MODE_FLAG_SAFETY_ARMED == MAV_MODE_FLAG_SAFETY_ARMED
    }
}

/// Command acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    pub command: u16,
    /// MAV_RESULT, 0 = accepted
    pub result: u8,
}

impl CommandAck {
    pub fn is_accepted(&self) -> bool {
        self.result == 0
    }
}

/// Message classes the aggregator consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    Attitude,
    VfrHud,
    GlobalPosition,
    BatteryStatus,
    HomePosition,
    CommandAck,
}

impl MessageKind {
    /// MAVLink message id of this class
    pub fn message_id(&self) -> u32 {
        match self {
            MessageKind::Heartbeat => MSG_ID_HEARTBEAT,
            MessageKind::Attitude => MSG_ID_ATTITUDE,
            MessageKind::VfrHud => MSG_ID_VFR_HUD,
            MessageKind::GlobalPosition => MSG_ID_GLOBAL_POSITION_INT,
            MessageKind::BatteryStatus => MSG_ID_BATTERY_STATUS,
            MessageKind::HomePosition => MSG_ID_HOME_POSITION,
            MessageKind::CommandAck => MSG_ID_COMMAND_ACK,
        }
    }
}

/// Decoded vehicle-link message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryMessage {
    Heartbeat(Heartbeat),
    Attitude(Attitude),
    VfrHud(VfrHud),
    GlobalPosition(GlobalPosition),
    BatteryStatus(BatteryStatus),
    HomePosition(HomePosition),
    CommandAck(CommandAck),
}

impl TelemetryMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            TelemetryMessage::Heartbeat(_) => MessageKind::Heartbeat,
            TelemetryMessage::Attitude(_) => MessageKind::Attitude,
            TelemetryMessage::VfrHud(_) => MessageKind::VfrHud,
            TelemetryMessage::GlobalPosition(_) => MessageKind::GlobalPosition,
            TelemetryMessage::BatteryStatus(_) => MessageKind::BatteryStatus,
            TelemetryMessage::HomePosition(_) => MessageKind::HomePosition,
            TelemetryMessage::CommandAck(_) => MessageKind::CommandAck,
        }
    }

    /// Reject field values that would poison the snapshot
    ///
    /// # Errors
    ///
    /// Returns `OsdError::Decode` for non-finite angles or speeds,
    /// coordinates outside ±90/±180 degrees, or an unknown battery voltage.
    pub fn validate(&self) -> Result<()> {
        match self {
            TelemetryMessage::Attitude(a) => {
                if !a.pitch.is_finite() || !a.roll.is_finite() {
                    return Err(OsdError::Decode(format!(
                        "non-finite attitude: pitch={} roll={}",
                        a.pitch, a.roll
                    )));
                }
            }
            TelemetryMessage::VfrHud(h) => {
                if !h.groundspeed.is_finite() {
                    return Err(OsdError::Decode(format!(
                        "non-finite groundspeed: {}",
                        h.groundspeed
                    )));
                }
            }
            TelemetryMessage::GlobalPosition(p) => check_coordinates(p.lat_e7, p.lon_e7)?,
            TelemetryMessage::HomePosition(p) => check_coordinates(p.lat_e7, p.lon_e7)?,
            TelemetryMessage::BatteryStatus(b) => {
                if b.first_cell_mv == VOLTAGE_UNKNOWN_MV {
                    return Err(OsdError::Decode("battery voltage unknown".to_string()));
                }
            }
            TelemetryMessage::Heartbeat(_) | TelemetryMessage::CommandAck(_) => {}
        }
        Ok(())
    }
}

fn check_coordinates(lat_e7: i32, lon_e7: i32) -> Result<()> {
    if lat_e7.unsigned_abs() > 900_000_000 || lon_e7.unsigned_abs() > 1_800_000_000 {
        return Err(OsdError::Decode(format!(
            "coordinates out of range: lat_e7={} lon_e7={}",
            lat_e7, lon_e7
        )));
    }
    Ok(())
}
