//! # meshwatch-types
//!
//! Core types for mesh network telemetry. This crate defines what the
//! aggregator stores about each node, the topology and history views derived
//! from that state, and the messages pushed to viewers.
//!
//! ## Features
//!
//! - `serde`: JSON serialization using the camelCase field names that mesh
//!   firmware and dashboards already speak
//!
//! ## Example
//!
//! ```rust
//! use meshwatch_types::{NodeId, NodeRecord, TimeSource};
//!
//! let mut record = NodeRecord::new(NodeId::new(4).unwrap(), 1_700_000_000_000);
//! record.telemetry.temperature = Some(19.5);
//! record.routing.time_source = TimeSource::parse("GPS");
//!
//! assert!(record.online);
//! assert_eq!(record.routing.time_source, TimeSource::Gps);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. It is carried in every state
//! envelope so viewers can detect format changes.

mod message;
mod node;
mod packet;
mod stats;
mod topology;
mod version;

pub use message::*;
pub use node::*;
pub use packet::*;
pub use stats::*;
pub use topology::*;
pub use version::*;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Current Unix time in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
