//! # Signal Quality Module
//!
//! Polls the cellular modem monitor for a link-quality score and publishes
//! the latest value for the event stream.
//!
//! The monitor answers `GET /signal_quality` with a bare number (0-100) as
//! plain text. A failed poll keeps the last good value; the stream never
//! blocks on the modem.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SignalConfig;
use crate::error::{OsdError, Result};

/// Something that can report the current signal-quality score
pub trait SignalSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<f64>> + Send;
}

/// Parse the monitor's plain-text response body
///
/// # Errors
///
/// Returns `OsdError::UpstreamUnavailable` if the body is not a finite number
pub fn parse_score(body: &str) -> Result<f64> {
    let trimmed = body.trim();
    let score: f64 = trimmed
        .parse()
        .map_err(|_| OsdError::UpstreamUnavailable(format!("not a number: {:?}", trimmed)))?;

    if !score.is_finite() {
        return Err(OsdError::UpstreamUnavailable(format!("non-finite score: {}", score)));
    }
    Ok(score)
}

/// Signal source backed by the monitor's HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpSignalSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSignalSource {
    /// # Errors
    ///
    /// Returns `OsdError::UpstreamUnavailable` if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| OsdError::UpstreamUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &SignalConfig) -> Result<Self> {
        Self::new(config.url.clone(), Duration::from_millis(config.request_timeout_ms))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SignalSource for HttpSignalSource {
    async fn fetch(&self) -> Result<f64> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OsdError::UpstreamUnavailable(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| OsdError::UpstreamUnavailable(e.to_string()))?;

        parse_score(&body)
    }
}

/// Periodic poller publishing the latest score
pub struct SignalPoller<S: SignalSource> {
    source: S,
    poll_interval: Duration,
    latest: watch::Sender<f64>,
}

impl<S: SignalSource + 'static> SignalPoller<S> {
    /// Create the poller and a receiver for its value
    ///
    /// The value starts at 0 until the first successful poll.
    pub fn new(source: S, poll_interval: Duration) -> (Self, watch::Receiver<f64>) {
        let (latest, rx) = watch::channel(0.0);
        let poller = Self {
            source,
            poll_interval,
            latest,
        };
        (poller, rx)
    }

    /// Spawn the poller as an async task
    pub fn start(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Poll until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Signal-quality poller started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => self.poll_once().await,
            }
        }

        debug!("Signal-quality poller stopped");
    }

    async fn poll_once(&self) {
        match self.source.fetch().await {
            Ok(score) => {
                self.latest.send_replace(score);
                debug!(score, "Signal quality updated");
            }
            Err(e) => warn!(error = %e, "Signal-quality poll failed, keeping last value"),
        }
    }
}
