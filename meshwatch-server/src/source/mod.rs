//! Transports that feed raw units to the aggregator.
//!
//! Every transport pushes one `String` per unit (a serial line or a UDP
//! datagram) into an mpsc channel; [`pump`] drains that channel into the
//! aggregator. Transports never touch aggregator state directly.

mod line;
#[cfg(feature = "serial")]
mod serial;
mod udp;

pub use line::spawn_lines;
#[cfg(feature = "serial")]
pub use serial::{detect_port, LineBuffer, SerialSource};
pub use udp::UdpSource;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meshwatch_core::{Aggregator, Command, CommandResponse};
use tokio::sync::mpsc;

/// Depth of the queue between a transport and the aggregator.
pub const UNIT_QUEUE_DEPTH: usize = 256;

/// Apply every unit from `rx` until all transports hang up.
pub async fn pump(mut rx: mpsc::Receiver<String>, aggregator: Aggregator) {
    while let Some(unit) = rx.recv().await {
        aggregator.ingest_unit(&unit);
    }
    tracing::info!("transport closed");
}

/// Write side of a transport that accepts commands.
#[derive(Debug, Clone)]
pub struct CommandLink {
    tx: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
}

impl CommandLink {
    /// Create a link and the receiver the transport writes from.
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(depth);
        let link = Self {
            tx,
            connected: Arc::new(AtomicBool::new(false)),
        };
        (link, rx)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Queue a command for the transport and describe the outcome.
    pub fn submit(&self, command: &Command) -> CommandResponse {
        if !self.is_connected() {
            return not_connected(command);
        }
        match self.tx.try_send(command.to_line()) {
            Ok(()) => command.accepted(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                CommandResponse::failed(command.name(), "Command queue full")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => not_connected(command),
        }
    }
}

/// Response for a command with nowhere to go.
pub fn not_connected(command: &Command) -> CommandResponse {
    CommandResponse::failed(command.name(), "Serial port not connected")
}
