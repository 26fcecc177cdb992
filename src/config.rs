//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; an empty file (or no file at all)
//! yields the defaults below.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{OsdError, Result};
use crate::link::Endpoint;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub rates: RatesConfig,
    pub signal: SignalConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

/// Vehicle-link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// `udpin:host:port`, `udp:host:port` or `udpout:host:port`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Receive-loop wait before yielding
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// Silence after which the session is dropped and re-established
    #[serde(default = "default_link_loss_timeout_ms")]
    pub link_loss_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_max_reconnect_interval_ms")]
    pub max_reconnect_interval_ms: u64,
}

/// Stream-rate configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RatesConfig {
    /// How often the full request set is re-sent
    #[serde(default = "default_rates_period_ms")]
    pub period_ms: u64,

    /// Attitude and HUD interval in microseconds
    #[serde(default = "default_fast_interval_us")]
    pub fast_interval_us: u32,

    /// Position, battery, home and heartbeat interval in microseconds
    #[serde(default = "default_slow_interval_us")]
    pub slow_interval_us: u32,

    #[serde(default = "default_ack_wait_ms")]
    pub ack_wait_ms: u64,
}

/// Signal-quality source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SignalConfig {
    #[serde(default = "default_signal_url")]
    pub url: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Event-stream server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Also wake stream consumers on HUD updates
    #[serde(default)]
    pub notify_on_hud: bool,
}

/// Log file configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for a daily-rolling log file; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_endpoint() -> String { "udpin:0.0.0.0:14555".to_string() }
fn default_handshake_timeout_ms() -> u64 { 30000 }
fn default_recv_timeout_ms() -> u64 { 40 }
fn default_link_loss_timeout_ms() -> u64 { 5000 }
fn default_reconnect_interval_ms() -> u64 { 1000 }
fn default_max_reconnect_interval_ms() -> u64 { 30000 }

fn default_rates_period_ms() -> u64 { 1000 }
fn default_fast_interval_us() -> u32 { 30_000 }
fn default_slow_interval_us() -> u32 { 100_000 }
fn default_ack_wait_ms() -> u64 { 10 }

fn default_signal_url() -> String { "http://plane:8133/signal_quality".to_string() }
fn default_poll_interval_ms() -> u64 { 10000 }
fn default_request_timeout_ms() -> u64 { 2000 }

fn default_bind() -> String { "0.0.0.0:5000".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            link_loss_timeout_ms: default_link_loss_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_interval_ms: default_max_reconnect_interval_ms(),
        }
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            period_ms: default_rates_period_ms(),
            fast_interval_us: default_fast_interval_us(),
            slow_interval_us: default_slow_interval_us(),
            ack_wait_ms: default_ack_wait_ms(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            url: default_signal_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            notify_on_hud: false,
        }
    }
}

fn invalid(message: &str) -> OsdError {
    OsdError::Config(toml::de::Error::custom(message))
}

fn check_range(value: u64, min: u64, max: u64, name: &str) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(&format!("{} must be between {} and {}", name, min, max)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use osd_telemetry::config::Config;
    ///
    /// let config = Config::load("config/osd.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is malformed or any value is out of its
    /// valid range
    pub fn validate(&self) -> Result<()> {
        // Reported as InvalidEndpoint, not a toml error
        self.link.endpoint.parse::<Endpoint>()?;

        check_range(self.link.handshake_timeout_ms, 1, 600_000, "handshake_timeout_ms")?;
        check_range(self.link.recv_timeout_ms, 1, 1000, "recv_timeout_ms")?;
        check_range(self.link.link_loss_timeout_ms, 100, 600_000, "link_loss_timeout_ms")?;
        check_range(self.link.reconnect_interval_ms, 1, 60_000, "reconnect_interval_ms")?;

        if self.link.max_reconnect_interval_ms < self.link.reconnect_interval_ms {
            return Err(invalid("max_reconnect_interval_ms must not be below reconnect_interval_ms"));
        }

        // Receive loops must yield inside the link-loss window
        if self.link.recv_timeout_ms >= self.link.link_loss_timeout_ms {
            return Err(invalid("recv_timeout_ms must be shorter than link_loss_timeout_ms"));
        }

        check_range(self.rates.period_ms, 100, 60_000, "period_ms")?;
        check_range(self.rates.ack_wait_ms, 0, 1000, "ack_wait_ms")?;

        if self.rates.fast_interval_us == 0 || self.rates.slow_interval_us == 0 {
            return Err(invalid("stream intervals must be greater than 0"));
        }

        if !self.signal.url.starts_with("http://") && !self.signal.url.starts_with("https://") {
            return Err(invalid("signal url must be an http(s) URL"));
        }

        check_range(self.signal.poll_interval_ms, 100, 3_600_000, "poll_interval_ms")?;
        check_range(self.signal.request_timeout_ms, 1, 60_000, "request_timeout_ms")?;

        if self.stream.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid("stream bind must be an ip:port address"));
        }

        if let Some(dir) = &self.logging.dir {
            if dir.is_empty() {
                return Err(invalid("logging dir cannot be empty when set"));
            }
        }

        Ok(())
    }
}
