//! # MAVLink Datagram Decoder
//!
//! Splits a received datagram into MAVLink frames and converts the ones the
//! aggregator consumes into [`TelemetryMessage`] values.

use mavlink::common::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::MavHeader;

use super::protocol::*;
use crate::error::{OsdError, Result};

/// Decode every frame in a datagram
///
/// Frames may be MAVLink v1 or v2; the version is chosen from each frame's
/// start byte. Frames with a bad checksum are skipped by the reader.
///
/// # Arguments
///
/// * `datagram` - Raw datagram payload
///
/// # Returns
///
/// * `Result<Vec<(MavHeader, MavMessage)>>` - Decoded frames in arrival order
///
/// # Errors
///
/// Returns `OsdError::Decode` if the first frame cannot be parsed. A parse
/// failure after at least one good frame ends decoding and keeps what was
/// already read.
pub fn parse_datagram(datagram: &[u8]) -> Result<Vec<(MavHeader, MavMessage)>> {
    let mut cursor = datagram;
    let mut frames = Vec::new();

    while let Some(&start) = cursor.first() {
        let result = if start == MAV_STX_V1 {
            mavlink::read_v1_msg::<MavMessage, _>(&mut cursor)
        } else {
            mavlink::read_v2_msg::<MavMessage, _>(&mut cursor)
        };

        match result {
            Ok(frame) => frames.push(frame),
            Err(MessageReadError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                if frames.is_empty() {
                    return Err(OsdError::Decode(e.to_string()));
                }
                break;
            }
        }
    }

    Ok(frames)
}

/// Convert a MAVLink message into the aggregator's vocabulary
///
/// # Returns
///
/// * `Option<TelemetryMessage>` - `None` for message types the aggregator
///   does not consume
pub fn to_telemetry(message: &MavMessage) -> Option<TelemetryMessage> {
    let decoded = match message {
        MavMessage::HEARTBEAT(data) => TelemetryMessage::Heartbeat(Heartbeat {
            base_mode: data.base_mode.bits(),
            custom_mode: data.custom_mode,
            vehicle_type: data.mavtype as u8,
            autopilot: data.autopilot as u8,
        }),
        MavMessage::ATTITUDE(data) => TelemetryMessage::Attitude(Attitude {
            pitch: data.pitch,
            roll: data.roll,
        }),
        MavMessage::VFR_HUD(data) => TelemetryMessage::VfrHud(VfrHud {
            groundspeed: data.groundspeed,
            heading: data.heading,
        }),
        MavMessage::GLOBAL_POSITION_INT(data) => TelemetryMessage::GlobalPosition(GlobalPosition {
            relative_alt_mm: data.relative_alt,
            lat_e7: data.lat,
            lon_e7: data.lon,
        }),
        MavMessage::BATTERY_STATUS(data) => TelemetryMessage::BatteryStatus(BatteryStatus {
            first_cell_mv: data.voltages[0],
            consumed_mah: data.current_consumed,
            current_ca: data.current_battery,
        }),
        MavMessage::HOME_POSITION(data) => TelemetryMessage::HomePosition(HomePosition {
            lat_e7: data.latitude,
            lon_e7: data.longitude,
        }),
        MavMessage::COMMAND_ACK(data) => TelemetryMessage::CommandAck(CommandAck {
            command: data.command as u16,
            result: data.result as u8,
        }),
        _ => return None,
    };
    Some(decoded)
}
