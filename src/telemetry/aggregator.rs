//! # Telemetry Aggregator
//!
//! Single task that owns the [`TelemetryState`]. Receive loops push decoded
//! messages in through an [`AggregatorHandle`]; readers ask for copies of the
//! snapshot over a request/response channel. Nothing else touches the state,
//! so the fast and slow ingress paths and the stream readers never contend on
//! a lock.
//!
//! ```text
//! fast loop ─┐                    ┌─► ChangeSignal ─► listeners
//!            ├─► mpsc ─► Aggregator
//! slow loop ─┘        ▲           └─► oneshot ─► snapshot()
//!                     └─ snapshot requests
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::ingress::NotifyPolicy;
use super::notify::{ChangeListener, ChangeSignal};
use super::state::{TelemetrySnapshot, TelemetryState};
use crate::error::{OsdError, Result};
use crate::link::protocol::TelemetryMessage;

/// Command queue depth between the receive loops and the aggregator
pub const COMMAND_QUEUE_DEPTH: usize = 256;

enum Command {
    Ingest(TelemetryMessage),
    Snapshot(oneshot::Sender<TelemetrySnapshot>),
}

/// Counters reported when the aggregator stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub applied: u64,
    pub skipped: u64,
    pub notifications: u64,
}

/// State owner task
pub struct Aggregator {
    state: TelemetryState,
    commands: mpsc::Receiver<Command>,
    signal: Arc<ChangeSignal>,
    policy: NotifyPolicy,
    stats: AggregatorStats,
}

/// Cloneable entry point to a running [`Aggregator`]
#[derive(Clone)]
pub struct AggregatorHandle {
    commands: mpsc::Sender<Command>,
    signal: Arc<ChangeSignal>,
}

impl std::fmt::Debug for AggregatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorHandle")
            .field("listeners", &self.signal.listener_count())
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Create the aggregator and its handle
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use osd_telemetry::telemetry::aggregator::Aggregator;
    /// use osd_telemetry::telemetry::ingress::NotifyPolicy;
    /// use osd_telemetry::telemetry::state::TelemetryState;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn run() {
    /// let (aggregator, handle) = Aggregator::new(TelemetryState::new(), NotifyPolicy::default());
    /// let task = aggregator.start(CancellationToken::new());
    /// let snapshot = handle.snapshot().await;
    /// # }
    /// ```
    pub fn new(state: TelemetryState, policy: NotifyPolicy) -> (Self, AggregatorHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let signal = Arc::new(ChangeSignal::new());

        let aggregator = Self {
            state,
            commands: rx,
            signal: signal.clone(),
            policy,
            stats: AggregatorStats::default(),
        };
        let handle = AggregatorHandle {
            commands: tx,
            signal,
        };
        (aggregator, handle)
    }

    /// Spawn the aggregator as an async task
    pub fn start(self, cancel: CancellationToken) -> tokio::task::JoinHandle<AggregatorStats> {
        tokio::spawn(self.run(cancel))
    }

    /// Process commands until cancelled or every handle is dropped
    pub async fn run(mut self, cancel: CancellationToken) -> AggregatorStats {
        info!(notify_on_hud = self.policy.notify_on_hud, "Telemetry aggregator started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Aggregator cancelled");
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("All aggregator handles dropped");
                        break;
                    }
                }
            }
        }

        info!(
            applied = self.stats.applied,
            skipped = self.stats.skipped,
            notifications = self.stats.notifications,
            "Telemetry aggregator stopped"
        );
        self.stats
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Ingest(message) => match self.state.apply(&message, self.policy) {
                Ok(update) => {
                    self.stats.applied += 1;
                    if update.should_notify() {
                        self.stats.notifications += 1;
                        self.signal.signal();
                    }
                }
                Err(e) => {
                    self.stats.skipped += 1;
                    debug!(kind = ?message.kind(), error = %e, "Skipping message");
                }
            },
            Command::Snapshot(reply) => {
                if reply.send(self.state.snapshot()).is_err() {
                    trace!("Snapshot requester went away");
                }
            }
        }
    }
}

impl AggregatorHandle {
    /// Queue a decoded message for the aggregator
    ///
    /// Waits for queue space, so a receive loop applies its messages in the
    /// order it received them.
    pub async fn ingest(&self, message: TelemetryMessage) -> Result<()> {
        self.commands
            .send(Command::Ingest(message))
            .await
            .map_err(|_| OsdError::ChannelClosed("aggregator stopped"))
    }

    /// Copy of the snapshot as of now
    pub async fn snapshot(&self) -> Result<TelemetrySnapshot> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .await
            .map_err(|_| OsdError::ChannelClosed("aggregator stopped"))?;
        rx.await
            .map_err(|_| OsdError::ChannelClosed("aggregator dropped snapshot request"))
    }

    /// Whether the aggregator task has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Register a change consumer
    pub fn subscribe(&self) -> ChangeListener {
        self.signal.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::protocol::{Attitude, GlobalPosition, VfrHud};
    use std::time::Duration;
    use tokio::time::timeout;

    fn spawn(policy: NotifyPolicy) -> (AggregatorHandle, CancellationToken, tokio::task::JoinHandle<AggregatorStats>) {
        let (aggregator, handle) = Aggregator::new(TelemetryState::new(), policy);
        let cancel = CancellationToken::new();
        let task = aggregator.start(cancel.clone());
        (handle, cancel, task)
    }

    #[tokio::test]
    async fn test_snapshot_reflects_ingested_messages() {
        let (handle, cancel, task) = spawn(NotifyPolicy::default());

        handle
            .ingest(TelemetryMessage::GlobalPosition(GlobalPosition {
                relative_alt_mm: 5_000,
                lat_e7: 10_000_000,
                lon_e7: 20_000_000,
            }))
            .await
            .unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert!((snapshot.altitude - 5.0).abs() < 1e-9);
        assert!((snapshot.latitude - 1.0).abs() < 1e-9);

        cancel.cancel();
        let stats = task.await.unwrap();
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.notifications, 0);
    }

    #[tokio::test]
    async fn test_attitude_wakes_listener() {
        let (handle, cancel, _task) = spawn(NotifyPolicy::default());
        let mut listener = handle.subscribe();

        handle
            .ingest(TelemetryMessage::Attitude(Attitude { pitch: 0.1, roll: 0.2 }))
            .await
            .unwrap();

        timeout(Duration::from_secs(1), listener.wait_and_consume(&cancel))
            .await
            .expect("attitude must wake the listener")
            .unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_hud_does_not_wake_listener() {
        let (handle, cancel, _task) = spawn(NotifyPolicy::default());
        let listener = handle.subscribe();

        handle
            .ingest(TelemetryMessage::VfrHud(VfrHud { groundspeed: 4.0, heading: 90 }))
            .await
            .unwrap();
        // round-trip through the actor so the HUD message has been applied
        let snapshot = handle.snapshot().await.unwrap();

        assert_eq!(snapshot.speed, 4.0);
        assert!(!listener.is_pending());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_invalid_message_is_skipped() {
        let (handle, cancel, task) = spawn(NotifyPolicy::default());

        handle
            .ingest(TelemetryMessage::Attitude(Attitude { pitch: f32::NAN, roll: 0.0 }))
            .await
            .unwrap();
        handle
            .ingest(TelemetryMessage::Attitude(Attitude { pitch: 0.0, roll: 0.0 }))
            .await
            .unwrap();
        handle.snapshot().await.unwrap();

        cancel.cancel();
        let stats = task.await.unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.applied, 1);
    }

    #[tokio::test]
    async fn test_handle_errors_after_stop() {
        let (handle, cancel, task) = spawn(NotifyPolicy::default());
        cancel.cancel();
        task.await.unwrap();

        let result = handle.snapshot().await;
        assert!(matches!(result, Err(OsdError::ChannelClosed(_))));
        assert!(handle.is_closed());
    }
}
