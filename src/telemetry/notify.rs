//! # Change Signal
//!
//! Wakes snapshot consumers after the aggregator applied a notifying update.
//!
//! Every consumer holds its own [`ChangeListener`] with a single pending slot.
//! [`ChangeSignal::signal`] sets the slot of every listener and never blocks;
//! [`ChangeListener::wait_and_consume`] waits for the caller's slot and clears
//! it. Signals raised while a consumer is busy coalesce into one wake-up, so a
//! slow consumer sees the latest state rather than a backlog, and one consumer
//! can never steal another's wake-up.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{OsdError, Result};

/// Producer side, owned by the aggregator
#[derive(Debug)]
pub struct ChangeSignal {
    generation: watch::Sender<u64>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self { generation }
    }

    /// Mark every listener pending and wake those currently waiting
    pub fn signal(&self) {
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
    }

    /// Register a new consumer
    ///
    /// The listener starts with no pending signal; only signals raised after
    /// this call wake it.
    pub fn subscribe(&self) -> ChangeListener {
        ChangeListener {
            generation: self.generation.subscribe(),
        }
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.generation.receiver_count()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side, one per reader
#[derive(Debug, Clone)]
pub struct ChangeListener {
    generation: watch::Receiver<u64>,
}

impl ChangeListener {
    /// Block until this listener is pending, then clear it
    ///
    /// # Errors
    ///
    /// * `OsdError::ChannelClosed` - `cancel` fired or the signal was dropped
    pub async fn wait_and_consume(&mut self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(OsdError::ChannelClosed("change signal cancelled")),

            changed = self.generation.changed() => {
                changed.map_err(|_| OsdError::ChannelClosed("change signal dropped"))
            }
        }
    }

    /// Whether a signal is waiting to be consumed
    pub fn is_pending(&self) -> bool {
        self.generation.has_changed().unwrap_or(false)
    }
}
