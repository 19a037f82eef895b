//! # meshwatch-adapters
//!
//! External telemetry services that node readings can be forwarded to.
//!
//! Each adapter implements [`meshwatch_core::TelemetrySink`]; hand one to
//! [`meshwatch_core::AggregatorBuilder::sink`] and the aggregator takes care
//! of per-node rate limiting and timeouts.
//!
//! ## Supported Services
//!
//! - **ThingSpeak** (`thingspeak` feature) - One channel per node, fed through
//!   the channel update API
//!
//! ## Quick Start (ThingSpeak)
//!
//! ```rust,no_run
//! # #[cfg(feature = "thingspeak")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use meshwatch_adapters::thingspeak::ThingSpeakSink;
//! use meshwatch_core::Aggregator;
//!
//! let sink = ThingSpeakSink::builder()
//!     .channel(2, "WRITE_KEY_NODE_2")
//!     .channel(3, "WRITE_KEY_NODE_3")
//!     .build()?;
//!
//! let aggregator = Aggregator::builder().sink(Arc::new(sink)).build()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "thingspeak"))]
//! # fn main() {}
//! ```

pub mod error;

#[cfg(feature = "thingspeak")]
pub mod thingspeak;

pub use error::AdapterError;

// Re-export types for convenience
pub use meshwatch_core::{SinkError, SinkReading, TelemetrySink};
