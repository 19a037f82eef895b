//! Layered settings: built-in defaults, an optional TOML file, `MESHWATCH_*`
//! environment variables, then command-line flags.
//!
//! ```toml
//! source = "serial"
//! root = 1
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [liveness]
//! offline_threshold = "90s"
//! sweep_interval = "5s"
//!
//! [thingspeak]
//! interval = "20s"
//!
//! [thingspeak.channels]
//! 2 = "WRITE_KEY_NODE_2"
//! ```
//!
//! Nested keys are set from the environment with a double underscore, e.g.
//! `MESHWATCH_SERIAL__PORT=/dev/ttyACM0`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use meshwatch_adapters::thingspeak::ThingSpeakSink;
use meshwatch_core::{Aggregator, SourceProfile};
use serde::Deserialize;

use crate::cli::Args;
use crate::duration;

/// Kind of upstream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Gateway node on a serial port
    #[default]
    Serial,
    /// Simulated nodes sending UDP datagrams
    Udp,
    /// Lines on standard input
    Stdin,
}

impl SourceKind {
    pub fn profile(self) -> SourceProfile {
        match self {
            SourceKind::Udp => SourceProfile::Simulation,
            SourceKind::Serial | SourceKind::Stdin => SourceProfile::Serial,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceKind,
    pub root: u32,
    pub serial: SerialSettings,
    pub udp: UdpSettings,
    pub http: HttpSettings,
    pub subscribers: SubscriberSettings,
    pub liveness: LivenessSettings,
    pub history: HistorySettings,
    pub thingspeak: Option<ThingSpeakSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            root: 1,
            serial: SerialSettings::default(),
            udp: UdpSettings::default(),
            http: HttpSettings::default(),
            subscribers: SubscriberSettings::default(),
            liveness: LivenessSettings::default(),
            history: HistorySettings::default(),
            thingspeak: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path; auto-detected when unset.
    pub port: Option<String>,
    pub baud: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UdpSettings {
    pub listen: String,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8889".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub enabled: bool,
    pub listen: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriberSettings {
    pub listen: String,
    #[serde(deserialize_with = "duration::deserialize")]
    pub write_timeout: Duration,
    pub queue_depth: usize,
    /// Console lines replayed to a viewer when it connects.
    pub console_replay: usize,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8081".to_string(),
            write_timeout: Duration::from_secs(5),
            queue_depth: meshwatch_core::DEFAULT_QUEUE_DEPTH,
            console_replay: meshwatch_core::DEFAULT_CONSOLE_REPLAY,
        }
    }
}

/// Unset values fall back to the source profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LivenessSettings {
    #[serde(deserialize_with = "duration::deserialize_option")]
    pub offline_threshold: Option<Duration>,
    #[serde(deserialize_with = "duration::deserialize_option")]
    pub sweep_interval: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    #[serde(deserialize_with = "duration::deserialize")]
    pub snapshot_interval: Duration,
    pub snapshots: usize,
    pub packets: usize,
    pub console_lines: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            snapshot_interval: meshwatch_core::DEFAULT_SNAPSHOT_INTERVAL,
            snapshots: meshwatch_core::DEFAULT_SNAPSHOT_CAPACITY,
            packets: meshwatch_core::DEFAULT_PACKET_CAPACITY,
            console_lines: meshwatch_core::DEFAULT_CONSOLE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThingSpeakSettings {
    pub enabled: bool,
    pub endpoint: Option<String>,
    #[serde(deserialize_with = "duration::deserialize")]
    pub interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
    /// Node id to channel write key.
    pub channels: BTreeMap<String, String>,
}

impl Default for ThingSpeakSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            interval: meshwatch_core::DEFAULT_SINK_INTERVAL,
            timeout: meshwatch_core::DEFAULT_SINK_TIMEOUT,
            channels: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load defaults, then the file (when given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("MESHWATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to read configuration")?;
        config
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Command-line flags win over every other source.
    pub fn apply(&mut self, args: &Args) {
        if let Some(source) = args.source {
            self.source = source;
        }
        if let Some(port) = &args.serial_port {
            self.serial.port = Some(port.clone());
        }
        if let Some(baud) = args.baud {
            self.serial.baud = baud;
        }
        if let Some(listen) = &args.udp_listen {
            self.udp.listen = listen.clone();
        }
        if let Some(listen) = &args.http_listen {
            self.http.listen = listen.clone();
        }
        if let Some(listen) = &args.subscriber_listen {
            self.subscribers.listen = listen.clone();
        }
        if let Some(root) = args.root {
            self.root = root;
        }
        if let Some(threshold) = args.offline_threshold {
            self.liveness.offline_threshold = Some(threshold);
        }
        if let Some(interval) = args.sweep_interval {
            self.liveness.sweep_interval = Some(interval);
        }
    }

    /// Build the aggregator these settings describe.
    ///
    /// Fails on any setting the aggregator rejects, so a bad configuration
    /// stops startup before a port is opened.
    pub fn aggregator(&self) -> Result<Aggregator> {
        let mut builder = Aggregator::builder()
            .root(self.root)
            .profile(self.source.profile())
            .snapshot_interval(self.history.snapshot_interval)
            .history_capacity(self.history.snapshots)
            .packet_capacity(self.history.packets)
            .console_capacity(self.history.console_lines)
            .console_replay(self.subscribers.console_replay)
            .queue_depth(self.subscribers.queue_depth);

        if let Some(threshold) = self.liveness.offline_threshold {
            builder = builder.offline_threshold(threshold);
        }
        if let Some(interval) = self.liveness.sweep_interval {
            builder = builder.sweep_interval(interval);
        }

        if let Some(thingspeak) = self.thingspeak.as_ref().filter(|t| t.enabled) {
            if let Some(sink) = thingspeak.sink()? {
                builder = builder
                    .sink(Arc::new(sink))
                    .sink_interval(thingspeak.interval)
                    .sink_timeout(thingspeak.timeout);
            }
        }

        builder.build().context("invalid aggregator settings")
    }
}

impl ThingSpeakSettings {
    /// `None` when no channel is configured.
    pub fn sink(&self) -> Result<Option<ThingSpeakSink>> {
        if self.channels.is_empty() {
            return Ok(None);
        }

        let mut builder = ThingSpeakSink::builder().timeout(self.timeout);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(endpoint.clone());
        }
        for (node, key) in &self.channels {
            let Ok(node) = node.trim().parse::<u32>() else {
                bail!("thingspeak channel key {node:?} is not a node id");
            };
            builder = builder.channel(node, key.clone());
        }

        Ok(Some(builder.build()?))
    }
}
