//! Rate-limited forwarding of node readings to an external telemetry service.
//!
//! Uploads are fire-and-forget: they run on their own task, never hold the
//! aggregator lock, and a slow or failing service only costs a log line.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshwatch_types::NodeId;
use parking_lot::Mutex;

use crate::error::SinkError;
use crate::normalize::NodeStatus;

/// Default minimum spacing between uploads for one node.
pub const DEFAULT_SINK_INTERVAL: Duration = Duration::from_secs(20);

/// Default upper bound on one upload.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// The values forwarded for one node report.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkReading {
    pub node_id: NodeId,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rssi: Option<f64>,
    pub satellites: Option<u32>,
    pub hop_distance: Option<u32>,
}

impl SinkReading {
    pub fn from_status(status: &NodeStatus) -> Self {
        Self {
            node_id: status.node_id,
            temperature: status.telemetry.temperature,
            humidity: status.telemetry.humidity,
            pressure: status.telemetry.pressure,
            latitude: status.telemetry.latitude,
            longitude: status.telemetry.longitude,
            rssi: Some(status.rssi),
            satellites: status.telemetry.satellites,
            hop_distance: Some(status.hop_distance),
        }
    }
}

/// An external service accepting node readings.
#[async_trait]
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether readings from `node` should be forwarded at all.
    fn accepts(&self, node: NodeId) -> bool;

    /// Upload one reading.
    async fn upload(&self, reading: &SinkReading) -> Result<(), SinkError>;
}

/// Upload outcome counters.
#[derive(Debug, Default)]
pub struct SinkStats {
    pub scheduled: AtomicU64,
    pub uploaded: AtomicU64,
    pub failed: AtomicU64,
    pub throttled: AtomicU64,
}

impl SinkStats {
    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Gates readings per node and runs uploads in the background.
///
/// The gate is keyed on the last attempt, successful or not, so a failing
/// service is not retried before the interval elapses.
#[derive(Debug)]
pub struct SinkDispatcher {
    sink: Arc<dyn TelemetrySink>,
    min_interval_ms: u64,
    timeout: Duration,
    last_attempt: Mutex<BTreeMap<NodeId, u64>>,
    stats: Arc<SinkStats>,
}

impl SinkDispatcher {
    pub fn new(sink: Arc<dyn TelemetrySink>, min_interval: Duration, timeout: Duration) -> Self {
        Self {
            sink,
            min_interval_ms: min_interval.as_millis() as u64,
            timeout,
            last_attempt: Mutex::new(BTreeMap::new()),
            stats: Arc::new(SinkStats::default()),
        }
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Schedule an upload if the node is accepted and its window has passed.
    ///
    /// Returns whether an upload was scheduled. Requires a tokio runtime;
    /// without one the reading is skipped.
    pub fn offer(&self, reading: SinkReading, now_ms: u64) -> bool {
        if !self.sink.accepts(reading.node_id) {
            return false;
        }
        if !self.claim(reading.node_id, now_ms) {
            self.stats.throttled.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sink = self.sink.name(), "no runtime, upload skipped");
            return false;
        };

        let sink = self.sink.clone();
        let stats = self.stats.clone();
        let timeout = self.timeout;
        stats.scheduled.fetch_add(1, Ordering::Relaxed);

        runtime.spawn(async move {
            let node = reading.node_id;
            match tokio::time::timeout(timeout, sink.upload(&reading)).await {
                Ok(Ok(())) => {
                    stats.uploaded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(sink = sink.name(), %node, "reading uploaded");
                }
                Ok(Err(e)) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(sink = sink.name(), %node, error = %e, "upload failed");
                }
                Err(_) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(sink = sink.name(), %node, "upload timed out");
                }
            }
        });

        true
    }

    fn claim(&self, node: NodeId, now_ms: u64) -> bool {
        let mut last_attempt = self.last_attempt.lock();
        match last_attempt.get(&node) {
            Some(&last) if now_ms.saturating_sub(last) < self.min_interval_ms => false,
            _ => {
                last_attempt.insert(node, now_ms);
                true
            }
        }
    }
}
