//! # Telemetry Module
//!
//! Aggregates decoded vehicle-link messages into one live snapshot.
//!
//! This module handles:
//! - Holding the published snapshot and its derived-state accumulators
//! - Applying attitude, HUD, position, battery, home and heartbeat updates
//! - Distance, home vector, flight time and mAh/km computations
//! - Waking snapshot consumers after notifying updates

pub mod aggregator;
pub mod geo;
pub mod ingress;
pub mod notify;
pub mod rolling;
pub mod state;

pub use aggregator::{Aggregator, AggregatorHandle};
pub use ingress::NotifyPolicy;
pub use notify::{ChangeListener, ChangeSignal};
pub use state::{TelemetrySnapshot, TelemetryState};
