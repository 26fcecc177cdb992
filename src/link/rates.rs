//! # Stream-Rate Configuration
//!
//! Re-requests the stream intervals we need on a fixed period. A missed or
//! rejected acknowledgment is logged and the request simply goes out again on
//! the next cycle, so rate configuration heals itself after a vehicle reboot.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, trace};

use super::encoder::set_message_interval;
use super::protocol::*;
use super::transport::Transport;
use super::MavlinkLink;
use crate::config::RatesConfig;
use crate::error::{OsdError, Result};

/// Intervals to request and how often
#[derive(Debug, Clone, PartialEq)]
pub struct RateSchedule {
    pub period: Duration,
    pub ack_wait: Duration,
    /// (message id, interval in µs)
    pub requests: Vec<(u32, u32)>,
}

impl RateSchedule {
    /// Fast attitude/HUD streams, slow position/battery/home/heartbeat streams
    pub fn from_config(config: &RatesConfig) -> Self {
        let fast = config.fast_interval_us;
        let slow = config.slow_interval_us;
        Self {
            period: Duration::from_millis(config.period_ms),
            ack_wait: Duration::from_millis(config.ack_wait_ms),
            requests: [
                (MessageKind::VfrHud, fast),
                (MessageKind::Attitude, fast),
                (MessageKind::GlobalPosition, slow),
                (MessageKind::BatteryStatus, slow),
                (MessageKind::HomePosition, slow),
                (MessageKind::Heartbeat, slow),
            ]
            .iter()
            .map(|(kind, interval_us)| (kind.message_id(), *interval_us))
            .collect(),
        }
    }
}

impl Default for RateSchedule {
    fn default() -> Self {
        Self::from_config(&RatesConfig::default())
    }
}

/// Periodic SET_MESSAGE_INTERVAL sender
pub struct RateConfigurator<'a, T: Transport> {
    link: &'a MavlinkLink<T>,
    schedule: RateSchedule,
    acks: mpsc::Receiver<CommandAck>,
}

impl<'a, T: Transport> RateConfigurator<'a, T> {
    /// # Arguments
    ///
    /// * `link` - Established session
    /// * `schedule` - Streams to request
    /// * `acks` - COMMAND_ACKs routed here by the receive pump
    pub fn new(link: &'a MavlinkLink<T>, schedule: RateSchedule, acks: mpsc::Receiver<CommandAck>) -> Self {
        Self { link, schedule, acks }
    }

    /// Issue the whole request set every period, forever
    ///
    /// # Errors
    ///
    /// Returns only on send failures; ack problems are not errors here.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = interval(self.schedule.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let accepted = self.configure_once().await?;
            trace!(accepted, total = self.schedule.requests.len(), "Stream rates requested");
        }
    }

    /// Send every request once, each followed by a short wait for its ack
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of requests the vehicle accepted
    pub async fn configure_once(&mut self) -> Result<usize> {
        let target = self.link.target();
        let mut accepted = 0;

        for (message_id, interval_us) in self.schedule.requests.clone() {
            self.discard_stale_acks();
            self.link
                .send_message(&set_message_interval(target, message_id, interval_us))
                .await?;

            match self.wait_for_ack().await {
                Ok(ack) if ack.is_accepted() => accepted += 1,
                Ok(ack) => debug!(message_id, result = ack.result, "Stream-rate request rejected"),
                Err(e) => debug!(message_id, error = %e, "Stream-rate request not acknowledged"),
            }
        }

        Ok(accepted)
    }

    /// Drop acks that arrived after their request's wait expired
    fn discard_stale_acks(&mut self) {
        while let Ok(ack) = self.acks.try_recv() {
            trace!(command = ack.command, result = ack.result, "Discarding late ack");
        }
    }

    /// Next SET_MESSAGE_INTERVAL ack within the configured wait
    ///
    /// Acks for other commands are discarded.
    ///
    /// # Errors
    ///
    /// * `OsdError::CommandAckTimeout` - Nothing arrived in time
    /// * `OsdError::ChannelClosed` - The receive pump stopped
    async fn wait_for_ack(&mut self) -> Result<CommandAck> {
        let wait = self.schedule.ack_wait;
        let acks = &mut self.acks;

        let result = timeout(wait, async {
            loop {
                match acks.recv().await {
                    Some(ack) if ack.command == MAV_CMD_SET_MESSAGE_INTERVAL => return Some(ack),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await;

        match result {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) => Err(OsdError::ChannelClosed("ack lane closed")),
            Err(_) => Err(OsdError::CommandAckTimeout(MAV_CMD_SET_MESSAGE_INTERVAL as u32)),
        }
    }
}
