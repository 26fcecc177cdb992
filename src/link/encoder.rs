//! # MAVLink Frame Encoder
//!
//! Builds the few messages we send to the vehicle: stream-rate commands and
//! our own GCS heartbeat.

use mavlink::common::{
    MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavState, MavType, COMMAND_LONG_DATA,
    HEARTBEAT_DATA,
};
use mavlink::MavHeader;

use super::Target;
use crate::error::{OsdError, Result};

/// System id we send as (ground station range)
pub const GCS_SYSTEM_ID: u8 = 255;

/// Component id we send as (MAV_COMP_ID_MISSIONPLANNER)
pub const GCS_COMPONENT_ID: u8 = 190;

/// Build a MAV_CMD_SET_MESSAGE_INTERVAL request
///
/// # Arguments
///
/// * `target` - Vehicle system/component learned from the handshake
/// * `message_id` - MAVLink id of the stream to configure
/// * `interval_us` - Desired interval in microseconds
///
/// # Returns
///
/// * `MavMessage` - COMMAND_LONG with param1 = message id, param2 = interval
pub fn set_message_interval(target: Target, message_id: u32, interval_us: u32) -> MavMessage {
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        param1: message_id as f32,
        param2: interval_us as f32,
        param3: 0.0,
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        // 0: flight-stack default response target
        param7: 0.0,
        command: MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
        target_system: target.system,
        target_component: target.component,
        confirmation: 0,
    })
}

/// Heartbeat announcing a ground station
pub fn gcs_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

/// Header for a frame we originate
pub fn gcs_header(sequence: u8) -> MavHeader {
    MavHeader {
        system_id: GCS_SYSTEM_ID,
        component_id: GCS_COMPONENT_ID,
        sequence,
    }
}

/// Serialize a message as a MAVLink v2 frame
///
/// # Errors
///
/// Returns `OsdError::Encode` if the message cannot be serialized
pub fn encode_frame(header: MavHeader, message: &MavMessage) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(64);
    mavlink::write_v2_msg(&mut frame, header, message)
        .map_err(|e| OsdError::Encode(e.to_string()))?;
    Ok(frame)
}
