//! # Receive Loops
//!
//! One pump task owns the socket reads and sorts decoded messages into lanes:
//! the fast lane carries attitude and HUD, the slow lane position, battery,
//! home and heartbeat, and acknowledgments go to the rate configurator. Each
//! lane has its own receive loop feeding the aggregator, so a burst of
//! fast-stream traffic never delays the slow-stream updates behind it.
//!
//! ```text
//!                     ┌─► fast lane ─► receive_loop ─┐
//! socket ─► pump ─────┼─► slow lane ─► receive_loop ─┼─► AggregatorHandle
//!                     └─► acks ─► RateConfigurator   ┘
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::protocol::{CommandAck, MessageKind, TelemetryMessage};
use super::transport::Transport;
use super::{MavlinkLink, MAX_DATAGRAM};
use crate::error::{OsdError, Result};
use crate::telemetry::AggregatorHandle;

/// Message classes on the fast lane
pub const FAST_LANE: &[MessageKind] = &[MessageKind::Attitude, MessageKind::VfrHud];

/// Message classes on the slow lane
pub const SLOW_LANE: &[MessageKind] = &[
    MessageKind::GlobalPosition,
    MessageKind::BatteryStatus,
    MessageKind::HomePosition,
    MessageKind::Heartbeat,
];

/// Queue depth of every lane
pub const LANE_DEPTH: usize = 64;

/// Sending half of the lanes, owned by the pump
#[derive(Debug, Clone)]
pub struct Router {
    fast: mpsc::Sender<TelemetryMessage>,
    slow: mpsc::Sender<TelemetryMessage>,
    acks: mpsc::Sender<CommandAck>,
}

/// Receiving half of the lanes
#[derive(Debug)]
pub struct Lanes {
    pub fast: mpsc::Receiver<TelemetryMessage>,
    pub slow: mpsc::Receiver<TelemetryMessage>,
    pub acks: mpsc::Receiver<CommandAck>,
}

/// Create a connected router and lane set
pub fn lanes() -> (Router, Lanes) {
    let (fast_tx, fast_rx) = mpsc::channel(LANE_DEPTH);
    let (slow_tx, slow_rx) = mpsc::channel(LANE_DEPTH);
    let (ack_tx, ack_rx) = mpsc::channel(LANE_DEPTH);

    let router = Router {
        fast: fast_tx,
        slow: slow_tx,
        acks: ack_tx,
    };
    let lanes = Lanes {
        fast: fast_rx,
        slow: slow_rx,
        acks: ack_rx,
    };
    (router, lanes)
}

impl Router {
    /// Put a message on its lane without waiting
    ///
    /// A full lane drops the message; the next sample of the same stream
    /// replaces it shortly anyway.
    ///
    /// # Errors
    ///
    /// Returns `OsdError::ChannelClosed` if the lane's consumer is gone
    pub fn route(&self, message: TelemetryMessage) -> Result<()> {
        let kind = message.kind();

        if let TelemetryMessage::CommandAck(ack) = message {
            offer(&self.acks, ack, kind)
        } else if FAST_LANE.contains(&kind) {
            offer(&self.fast, message, kind)
        } else if SLOW_LANE.contains(&kind) {
            offer(&self.slow, message, kind)
        } else {
            Ok(())
        }
    }
}

fn offer<V>(lane: &mpsc::Sender<V>, value: V, kind: MessageKind) -> Result<()> {
    match lane.try_send(value) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            trace!(?kind, "Lane full, dropping message");
            Ok(())
        }
        Err(TrySendError::Closed(_)) => Err(OsdError::ChannelClosed("receive lane closed")),
    }
}

/// Read the socket until the link goes quiet
///
/// # Arguments
///
/// * `link` - Established session
/// * `router` - Lane senders
/// * `link_loss` - Silence after which the session is considered lost
///
/// # Errors
///
/// * `OsdError::LinkLost` - No datagram within `link_loss`
/// * `OsdError::Io` - Socket failure
/// * `OsdError::ChannelClosed` - A lane consumer stopped
pub async fn pump<T: Transport>(link: &MavlinkLink<T>, router: Router, link_loss: Duration) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let messages = match timeout(link_loss, link.recv_frames(&mut buf)).await {
            Err(_) => return Err(OsdError::LinkLost(link_loss.as_millis() as u64)),
            Ok(Err(OsdError::Decode(e))) => {
                trace!(error = %e, "Dropping undecodable datagram");
                continue;
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(messages)) => messages,
        };

        for message in messages {
            router.route(message)?;
        }
    }
}

/// Forward one lane's messages to the aggregator
///
/// The receive timeout is only a yield point: expiry just starts the next
/// wait.
///
/// # Errors
///
/// Returns `OsdError::ChannelClosed` when the lane or the aggregator closes
pub async fn receive_loop(
    name: &'static str,
    mut lane: mpsc::Receiver<TelemetryMessage>,
    aggregator: &AggregatorHandle,
    recv_timeout: Duration,
) -> Result<()> {
    debug!(lane = name, "Receive loop started");

    loop {
        match timeout(recv_timeout, lane.recv()).await {
            Err(_) => continue,
            Ok(None) => return Err(OsdError::ChannelClosed("receive lane closed")),
            Ok(Some(message)) => aggregator.ingest(message).await?,
        }
    }
}
