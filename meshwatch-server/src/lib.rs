//! # meshwatch-server
//!
//! The aggregator process for a LoRa mesh: reads telemetry from a gateway
//! node (serial), a simulator (UDP), or standard input, and serves the
//! resulting state to viewers.
//!
//! ```text
//!   serial / UDP / stdin
//!           │  one unit per line or datagram
//!           ▼
//!     ┌───────────┐   NDJSON over TCP    ┌─────────┐
//!     │ Aggregator│─────────────────────▶│ viewers │
//!     └─────┬─────┘◀──── commands ───────└─────────┘
//!           │
//!           ├──▶ HTTP query API (/api/data, /api/topology, ...)
//!           └──▶ ThingSpeak channels (optional)
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Gateway on an auto-detected USB-serial adapter
//! meshwatch
//!
//! # Simulator sending datagrams
//! meshwatch --source udp --udp-listen 0.0.0.0:8889
//!
//! # Replay a captured log
//! meshwatch --source stdin < capture.log
//! ```
//!
//! Settings may also come from a TOML file (`--config`) and `MESHWATCH_*`
//! environment variables; see [`Settings`].

mod app;
pub mod cli;
pub mod config;
pub mod duration;
pub mod server;
pub mod source;

pub use app::run;
pub use cli::Args;
pub use config::{Settings, SourceKind};
pub use server::SubscriberServer;
