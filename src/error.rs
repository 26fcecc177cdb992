//! # Error Types
//!
//! Custom error types for OSD Telemetry using `thiserror`.

use thiserror::Error;

/// Main error type for OSD Telemetry
#[derive(Debug, Error)]
pub enum OsdError {
    /// No heartbeat arrived within the handshake bound
    #[error("No heartbeat received within {0} ms")]
    LinkTimeout(u64),

    /// The vehicle link went silent after a session was established
    #[error("Vehicle link lost: no data for {0} ms")]
    LinkLost(u64),

    /// Malformed or undecodable vehicle-link message
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outgoing message could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Rate-configuration command was not acknowledged in time
    #[error("No COMMAND_ACK for message id {0}")]
    CommandAckTimeout(u32),

    /// Signal-quality source could not be reached or returned garbage
    #[error("Signal-quality source unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Endpoint string is not `protocol:host:port`
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Aggregator task is gone or an internal channel was dropped
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for OSD Telemetry
pub type Result<T> = std::result::Result<T, OsdError>;
