//! # OSD Telemetry Library
//!
//! Aggregate MAVLink vehicle telemetry and cellular signal quality into a
//! live snapshot, pushed to an on-screen display as server-sent events.
//!
//! This library provides the vehicle link, the telemetry aggregator, the
//! signal-quality poller and the event-stream server behind the
//! `osd-telemetry` binary.

pub mod config;
pub mod error;
pub mod link;
pub mod signal_quality;
pub mod stream;
pub mod telemetry;
