//! # Link Session Supervisor
//!
//! Keeps a vehicle session alive: handshake, then rate configuration and the
//! receive loops until the link goes quiet, then reconnect with backoff.
//! The aggregated snapshot (home position included) lives in the aggregator
//! and survives reconnects.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::rates::{RateConfigurator, RateSchedule};
use super::receiver::{lanes, pump, receive_loop, Lanes};
use super::transport::Transport;
use super::transport::UdpTransport;
use super::{Endpoint, MavlinkLink};
use crate::config::Config;
use crate::error::{OsdError, Result};
use crate::telemetry::AggregatorHandle;

/// Timing and addressing for the supervised link
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub handshake_timeout: Duration,
    pub recv_timeout: Duration,
    pub link_loss: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_interval: Duration,
    pub schedule: RateSchedule,
}

impl SessionConfig {
    /// # Errors
    ///
    /// Returns `OsdError::InvalidEndpoint` if the endpoint string is malformed
    pub fn from_config(config: &Config) -> Result<Self> {
        let link = &config.link;
        Ok(Self {
            endpoint: link.endpoint.parse()?,
            handshake_timeout: Duration::from_millis(link.handshake_timeout_ms),
            recv_timeout: Duration::from_millis(link.recv_timeout_ms),
            link_loss: Duration::from_millis(link.link_loss_timeout_ms),
            reconnect_interval: Duration::from_millis(link.reconnect_interval_ms),
            max_reconnect_interval: Duration::from_millis(link.max_reconnect_interval_ms),
            schedule: RateSchedule::from_config(&config.rates),
        })
    }
}

/// Delay before reconnect attempt number `attempt` (0-based)
///
/// Doubles from `base` and saturates at `max`.
pub fn reconnect_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(max)
}

/// Drive one established session until it fails or `cancel` fires
///
/// Runs the receive pump, one receive loop per lane and the rate
/// configurator concurrently on the same task; the first to finish ends the
/// session.
///
/// # Returns
///
/// * `Ok(())` - Cancelled
/// * `Err(OsdError::LinkLost)` - Link went quiet
/// * `Err(_)` - Socket or channel failure
pub async fn run_session<T: Transport>(
    link: &MavlinkLink<T>,
    aggregator: &AggregatorHandle,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let (router, Lanes { fast, slow, acks }) = lanes();
    let configurator = RateConfigurator::new(link, config.schedule.clone(), acks);

    tokio::select! {
        biased;

        _ = cancel.cancelled() => Ok(()),
        result = pump(link, router, config.link_loss) => result,
        result = receive_loop("fast", fast, aggregator, config.recv_timeout) => result,
        result = receive_loop("slow", slow, aggregator, config.recv_timeout) => result,
        result = configurator.run() => result,
    }
}

/// Errors that reconnecting cannot fix
fn is_fatal(error: &OsdError) -> bool {
    match error {
        OsdError::InvalidEndpoint(_) => true,
        OsdError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::AddrInUse
                | std::io::ErrorKind::AddrNotAvailable
                | std::io::ErrorKind::PermissionDenied
        ),
        _ => false,
    }
}

/// Connect, run, and reconnect until cancelled
///
/// # Errors
///
/// Returns on errors that retrying cannot fix: a malformed endpoint or a
/// local address that cannot be bound.
pub async fn supervise(config: SessionConfig, aggregator: AggregatorHandle, cancel: CancellationToken) -> Result<()> {
    let mut attempt: u32 = 0;

    while !cancel.is_cancelled() {
        let connected =
            MavlinkLink::<UdpTransport>::connect(&config.endpoint, config.handshake_timeout, &cancel).await;

        let outcome = match connected {
            Ok(link) => {
                attempt = 0;
                info!(peer = %link.peer(), "Vehicle link established");
                run_session(&link, &aggregator, &config, &cancel).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => break,
            Err(_) if cancel.is_cancelled() => break,
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) if aggregator.is_closed() => return Err(e),
            Err(e) => {
                let delay = reconnect_backoff(config.reconnect_interval, config.max_reconnect_interval, attempt);
                attempt = attempt.saturating_add(1);
                warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Vehicle link down, reconnecting");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!("Link supervisor stopped");
    Ok(())
}
