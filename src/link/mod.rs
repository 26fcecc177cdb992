//! # Vehicle Link Module
//!
//! MAVLink-over-UDP connection to the flight controller.
//!
//! This module handles:
//! - Parsing `protocol:host:port` endpoint strings
//! - The heartbeat handshake that identifies the vehicle
//! - Sending commands and receiving decoded telemetry
//! - Stream-rate configuration, receive loops and reconnection

pub mod decoder;
pub mod encoder;
pub mod mode;
pub mod protocol;
pub mod rates;
pub mod receiver;
pub mod session;
pub mod transport;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use mavlink::common::{MavMessage, MavType};
use mavlink::MavHeader;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::{OsdError, Result};
use decoder::{parse_datagram, to_telemetry};
use encoder::{encode_frame, gcs_header, gcs_heartbeat};
use protocol::TelemetryMessage;
use transport::{Transport, UdpTransport};

/// Largest datagram we accept
pub const MAX_DATAGRAM: usize = 4096;

/// GCS heartbeat period while waiting for the vehicle in `udpout` mode
const GCS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// How the local socket relates to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointMode {
    /// Bind the address and learn the vehicle's address from its traffic
    Listen,
    /// Bind an ephemeral port and send to the address
    Connect,
}

/// Parsed `protocol:host:port` endpoint
///
/// # Examples
///
/// ```
/// use osd_telemetry::link::{Endpoint, EndpointMode};
///
/// let endpoint: Endpoint = "udpin:0.0.0.0:14555".parse().unwrap();
/// assert_eq!(endpoint.mode, EndpointMode::Listen);
/// assert_eq!(endpoint.address, "0.0.0.0:14555");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub mode: EndpointMode,
    /// `host:port`, resolved when connecting
    pub address: String,
}

impl FromStr for Endpoint {
    type Err = OsdError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || OsdError::InvalidEndpoint(s.to_string());

        let (protocol, address) = s.split_once(':').ok_or_else(invalid)?;
        let mode = match protocol {
            "udpin" | "udp" => EndpointMode::Listen,
            "udpout" => EndpointMode::Connect,
            _ => return Err(invalid()),
        };

        let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(invalid());
        }

        Ok(Self {
            mode,
            address: address.to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protocol = match self.mode {
            EndpointMode::Listen => "udpin",
            EndpointMode::Connect => "udpout",
        };
        write!(f, "{}:{}", protocol, self.address)
    }
}

impl Endpoint {
    async fn resolve(&self) -> Result<SocketAddr> {
        tokio::net::lookup_host(&self.address)
            .await?
            .next()
            .ok_or_else(|| OsdError::InvalidEndpoint(self.address.clone()))
    }
}

/// Vehicle system/component learned from the handshake heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub system: u8,
    pub component: u8,
}

/// Established MAVLink session
///
/// Shared by reference between the receive pump and the rate configurator;
/// every method takes `&self`.
pub struct MavlinkLink<T: Transport = UdpTransport> {
    transport: T,
    peer: SocketAddr,
    target: Target,
    sequence: AtomicU8,
}

impl<T: Transport> fmt::Debug for MavlinkLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MavlinkLink")
            .field("peer", &self.peer)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl MavlinkLink<UdpTransport> {
    /// Open the endpoint and wait for the vehicle's first heartbeat
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Where to listen or send
    /// * `handshake_timeout` - Upper bound on the wait for a heartbeat
    /// * `cancel` - Aborts the wait on shutdown
    ///
    /// # Errors
    ///
    /// * `OsdError::Io` - Socket could not be bound or the host not resolved
    /// * `OsdError::LinkTimeout` - No vehicle heartbeat within the bound
    /// * `OsdError::ChannelClosed` - Cancelled while waiting
    pub async fn connect(
        endpoint: &Endpoint,
        handshake_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let address = endpoint.resolve().await?;

        let (transport, peer) = match endpoint.mode {
            EndpointMode::Listen => (UdpTransport::bind(address).await?, None),
            EndpointMode::Connect => {
                let local: SocketAddr = if address.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                (UdpTransport::bind(local).await?, Some(address))
            }
        };

        info!(endpoint = %endpoint, local = ?transport.local_addr().ok(), "Waiting for vehicle heartbeat");
        Self::handshake(transport, peer, handshake_timeout, cancel).await
    }
}

impl<T: Transport> MavlinkLink<T> {
    /// Wait for a vehicle heartbeat on an already-open transport
    ///
    /// With a known `peer`, a GCS heartbeat is sent every second so the
    /// vehicle learns where to stream. Heartbeats from other ground stations
    /// are ignored.
    pub async fn handshake(
        transport: T,
        peer: Option<SocketAddr>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        let mut announce = interval(GCS_HEARTBEAT_INTERVAL);
        announce.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence: u8 = 0;
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(OsdError::ChannelClosed("handshake cancelled"));
                }

                _ = sleep_until(deadline) => {
                    return Err(OsdError::LinkTimeout(timeout.as_millis() as u64));
                }

                _ = announce.tick(), if peer.is_some() => {
                    if let Some(peer) = peer {
                        let frame = encode_frame(gcs_header(sequence), &gcs_heartbeat())?;
                        sequence = sequence.wrapping_add(1);
                        transport.send_to(&frame, peer).await?;
                        trace!(%peer, "Sent GCS heartbeat");
                    }
                }

                received = transport.recv_from(&mut buf) => {
                    let (len, from) = received?;
                    let frames = match parse_datagram(&buf[..len]) {
                        Ok(frames) => frames,
                        Err(e) => {
                            debug!(%from, error = %e, "Ignoring datagram during handshake");
                            continue;
                        }
                    };

                    for (header, message) in frames {
                        if let MavMessage::HEARTBEAT(hb) = &message {
                            if hb.mavtype == MavType::MAV_TYPE_GCS {
                                continue;
                            }
                            let target = Target {
                                system: header.system_id,
                                component: header.component_id,
                            };
                            let peer = peer.unwrap_or(from);
                            info!(%peer, system = target.system, component = target.component, "Vehicle heartbeat received");
                            return Ok(Self {
                                transport,
                                peer,
                                target,
                                sequence: AtomicU8::new(sequence),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Vehicle ids learned from the handshake
    pub fn target(&self) -> Target {
        self.target
    }

    /// Address outgoing frames are sent to
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Encode and send one message to the vehicle
    ///
    /// # Errors
    ///
    /// * `OsdError::Encode` - Message could not be serialized
    /// * `OsdError::Io` - Socket send failed
    pub async fn send_message(&self, message: &MavMessage) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(gcs_header(sequence), message)?;
        self.transport.send_to(&frame, self.peer).await?;
        Ok(())
    }

    /// Receive one datagram and decode the telemetry it carries
    ///
    /// Frames from systems other than the handshake target and message types
    /// the aggregator does not consume are dropped. Heartbeats count only
    /// from the target component; a companion computer or gimbal on the same
    /// system reports its own arming state and mode.
    ///
    /// # Errors
    ///
    /// * `OsdError::Io` - Socket receive failed
    /// * `OsdError::Decode` - Datagram held no parseable frame
    pub async fn recv_frames(&self, buf: &mut [u8]) -> Result<Vec<TelemetryMessage>> {
        let (len, _from) = self.transport.recv_from(buf).await?;
        let frames = parse_datagram(&buf[..len])?;

        Ok(frames
            .iter()
            .filter(|(header, message)| self.is_from_target(header, message))
            .filter_map(|(_, message)| to_telemetry(message))
            .collect())
    }

    fn is_from_target(&self, header: &MavHeader, message: &MavMessage) -> bool {
        if header.system_id != self.target.system {
            return false;
        }
        match message {
            MavMessage::HEARTBEAT(_) => header.component_id == self.target.component,
            _ => true,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Frame builders shared by the link tests

    use super::encoder::encode_frame;
    use mavlink::common::{
        MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA,
    };
    use mavlink::MavHeader;

    pub fn frame(system_id: u8, message: &MavMessage) -> Vec<u8> {
        component_frame(system_id, 1, message)
    }

    pub fn component_frame(system_id: u8, component_id: u8, message: &MavMessage) -> Vec<u8> {
        let header = MavHeader {
            system_id,
            component_id,
            sequence: 0,
        };
        encode_frame(header, message).unwrap()
    }

    pub fn heartbeat(mavtype: MavType) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }

    pub fn vehicle_heartbeat(system_id: u8) -> Vec<u8> {
        frame(system_id, &heartbeat(MavType::MAV_TYPE_FIXED_WING))
    }
}
