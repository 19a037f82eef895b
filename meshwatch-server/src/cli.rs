//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::SourceKind;
use crate::duration::parse_duration;

#[derive(Parser, Debug, Default)]
#[command(name = "meshwatch")]
#[command(version, about = "Telemetry aggregator for mesh sensor networks")]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "MESHWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where mesh records come from
    #[arg(short, long, value_enum)]
    pub source: Option<SourceKind>,

    /// Serial device of the gateway node (auto-detected when omitted)
    #[arg(short = 'p', long)]
    pub serial_port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// UDP address simulated nodes send to (e.g., "0.0.0.0:8889")
    #[arg(long)]
    pub udp_listen: Option<String>,

    /// HTTP query address (e.g., "0.0.0.0:8080")
    #[arg(long)]
    pub http_listen: Option<String>,

    /// Address viewers connect to for live updates (e.g., "0.0.0.0:8081")
    #[arg(long)]
    pub subscriber_listen: Option<String>,

    /// Id of the root (gateway) node
    #[arg(long)]
    pub root: Option<u32>,

    /// Silence after which a node is offline (e.g., "90s", "10s")
    #[arg(long, value_parser = parse_duration_arg)]
    pub offline_threshold: Option<Duration>,

    /// How often silent nodes are looked for (e.g., "5s", "500ms")
    #[arg(long, value_parser = parse_duration_arg)]
    pub sweep_interval: Option<Duration>,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}
