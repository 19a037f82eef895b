//! # meshwatch-core
//!
//! Telemetry state aggregator for mesh sensor networks.
//!
//! Raw records from the mesh (serial lines, UDP datagrams) are normalized
//! into events, folded into one authoritative state, and pushed to every
//! connected viewer.
//!
//! ```text
//!  transport unit
//!        │
//!        ▼
//!  ┌────────────┐   MeshEvent   ┌─────────────────────────────┐
//!  │ Normalizer │──────────────▶│ MeshState (single lock)     │
//!  └────────────┘               │  NodeStore ── TopologyCache │
//!        ▲                      │  HistoryRecorder            │
//!        │ sweep                │  gateway, stats, console    │
//!  ┌────────────┐               └──────────────┬──────────────┘
//!  │  Liveness  │──────────────────────────────┤ envelope
//!  └────────────┘                              ▼
//!                                       ┌─────────────┐
//!                                       │ Broadcaster │──▶ viewers
//!                                       └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshwatch_core::{Aggregator, SourceProfile};
//!
//! #[tokio::main]
//! async fn main() {
//!     let aggregator = Aggregator::builder()
//!         .root(1)
//!         .profile(SourceProfile::Serial)
//!         .build()
//!         .unwrap();
//!
//!     // Mark silent nodes offline in the background
//!     let liveness = aggregator.start();
//!
//!     let mut viewer = aggregator.subscribe();
//!     aggregator.ingest_unit(r#"{"type":"node_data","nodeId":2,"parentNode":1}"#);
//!
//!     while let Some(message) = viewer.recv().await {
//!         println!("{message:?}");
//!     }
//!
//!     liveness.stop();
//! }
//! ```
//!
//! ## Features
//!
//! - `http`: read-only HTTP query surface ([`http::QueryServer`])

mod aggregator;
mod broadcast;
mod command;
mod error;
mod history;
mod liveness;
mod normalize;
mod profile;
mod sink;
mod state;
mod store;
mod topology;

#[cfg(feature = "http")]
pub mod http;

pub use aggregator::{
    Aggregator, AggregatorBuilder, AggregatorConfig, Applied, CounterSnapshot,
    DEFAULT_CONSOLE_CAPACITY, DEFAULT_CONSOLE_REPLAY,
};
pub use broadcast::{Broadcaster, Delivery, SubscriberId, Subscription, DEFAULT_QUEUE_DEPTH};
pub use command::Command;
pub use error::{CommandError, ConfigError, SinkError};
pub use history::{
    HistoryRecorder, DEFAULT_PACKET_CAPACITY, DEFAULT_SNAPSHOT_CAPACITY,
    DEFAULT_SNAPSHOT_INTERVAL,
};
pub use liveness::{sweep, LivenessHandle, Transition};
pub use normalize::{
    classify, Beacon, DropReport, Ingress, MeshEvent, NodeStatus, Normalizer, PacketReport,
    Unrecognized, UnrecognizedReason,
};
pub use profile::SourceProfile;
pub use sink::{
    SinkDispatcher, SinkReading, SinkStats, TelemetrySink, DEFAULT_SINK_INTERVAL,
    DEFAULT_SINK_TIMEOUT,
};
pub use store::{effective_parent, NodeStore};
pub use topology::{build_graph, TopologyCache};

// Re-export types for convenience
pub use meshwatch_types::{
    CommandResponse, Message, NodeId, NodeRecord, StateEnvelope, TopologyView,
};
