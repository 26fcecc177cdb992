//! # Stream Module
//!
//! Turns snapshot wake-ups into server-sent events for the OSD page.
//!
//! Each event is one JSON object: every snapshot field plus `signal`, framed
//! as `data: {...}\n\n`.

pub mod server;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::telemetry::{AggregatorHandle, ChangeListener, TelemetrySnapshot};

/// `Content-Type` of the event stream
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// One pushed record
#[derive(Debug, Serialize)]
pub struct StreamPayload<'a> {
    #[serde(flatten)]
    pub snapshot: &'a TelemetrySnapshot,
    pub signal: f64,
}

/// Serialize a snapshot and signal score as JSON
pub fn payload_json(snapshot: &TelemetrySnapshot, signal: f64) -> Result<String> {
    Ok(serde_json::to_string(&StreamPayload { snapshot, signal })?)
}

/// Frame a snapshot as one server-sent event
///
/// # Examples
///
/// ```
/// use osd_telemetry::stream::format_event;
/// use osd_telemetry::telemetry::TelemetrySnapshot;
///
/// let event = format_event(&TelemetrySnapshot::default(), 0.0).unwrap();
/// assert!(event.starts_with("data: {"));
/// assert!(event.ends_with("}\n\n"));
/// ```
pub fn format_event(snapshot: &TelemetrySnapshot, signal: f64) -> Result<String> {
    Ok(format!("data: {}\n\n", payload_json(snapshot, signal)?))
}

/// Sources one consumer reads from
#[derive(Clone)]
pub struct StreamContext {
    pub aggregator: AggregatorHandle,
    pub signal: watch::Receiver<f64>,
    pub cancel: CancellationToken,
}

impl StreamContext {
    /// Current payload as JSON
    pub async fn current_json(&self) -> Result<String> {
        let snapshot = self.aggregator.snapshot().await?;
        let signal = *self.signal.borrow();
        payload_json(&snapshot, signal)
    }

    async fn next_event(&self) -> Result<Bytes> {
        let snapshot = self.aggregator.snapshot().await?;
        let signal = *self.signal.borrow();
        Ok(Bytes::from(format_event(&snapshot, signal)?))
    }
}

/// Event stream for one consumer
///
/// Yields one event per wake-up of `listener`, built from the snapshot as of
/// the wake-up. Ends on shutdown or when the aggregator stops.
pub fn event_stream(
    context: StreamContext,
    listener: ChangeListener,
) -> impl Stream<Item = Result<Bytes>> + 'static {
    futures::stream::unfold((context, listener), |(context, mut listener)| async move {
        if listener.wait_and_consume(&context.cancel).await.is_err() {
            debug!("Event stream closed");
            return None;
        }

        match context.next_event().await {
            Ok(event) => Some((Ok(event), (context, listener))),
            Err(e) => {
                warn!(error = %e, "Ending event stream");
                None
            }
        }
    })
}
