//! The aggregator: one handle over normalization, state, history and fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshwatch_types::{
    current_timestamp_ms, CommandResponse, HistoryResponse, Message, NodeId, NodeRecord,
    NodesResponse, PacketDirection, PacketEvent, StateResponse, TopologyResponse,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::broadcast::{Broadcaster, Delivery, SubscriberId, Subscription, DEFAULT_QUEUE_DEPTH};
use crate::error::ConfigError;
use crate::history::{
    HistoryRecorder, DEFAULT_PACKET_CAPACITY, DEFAULT_SNAPSHOT_CAPACITY,
    DEFAULT_SNAPSHOT_INTERVAL,
};
use crate::liveness::{self, LivenessHandle, Transition};
use crate::normalize::{classify, Ingress, MeshEvent, Normalizer, PacketReport};
use crate::profile::SourceProfile;
use crate::sink::{
    SinkDispatcher, SinkReading, TelemetrySink, DEFAULT_SINK_INTERVAL, DEFAULT_SINK_TIMEOUT,
};
use crate::state::MeshState;
use crate::store::NodeStore;

/// Default number of console lines retained.
pub const DEFAULT_CONSOLE_CAPACITY: usize = 500;

/// Default number of console lines replayed to a new subscriber.
pub const DEFAULT_CONSOLE_REPLAY: usize = 50;

/// Validated aggregator settings.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub root: NodeId,
    pub profile: SourceProfile,
    pub offline_threshold: Duration,
    pub sweep_interval: Duration,
    pub snapshot_interval: Duration,
    pub history_capacity: usize,
    pub packet_capacity: usize,
    pub console_capacity: usize,
    pub console_replay: usize,
    pub queue_depth: usize,
}

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// State changed; carries the new revision.
    Changed { revision: u64 },
    /// Recognized, but nothing observable changed.
    Unchanged,
    /// The record was not understood and was dropped.
    Unrecognized,
}

/// Running totals for ingestion and delivery.
#[derive(Debug, Default)]
pub struct IngestCounters {
    units: AtomicU64,
    applied: AtomicU64,
    unrecognized: AtomicU64,
    console_only: AtomicU64,
    broadcasts: AtomicU64,
    lagged: AtomicU64,
    removed: AtomicU64,
}

/// Point-in-time copy of [`IngestCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub units: u64,
    pub applied: u64,
    pub unrecognized: u64,
    pub console_only: u64,
    pub broadcasts: u64,
    pub lagged: u64,
    pub removed: u64,
}

impl IngestCounters {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            units: self.units.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            console_only: self.console_only.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }
}

/// Telemetry state aggregator for one mesh.
///
/// Cloning is cheap; all clones share the same state. Every mutation happens
/// under a single lock that is never held across an `.await`, and delivery
/// to viewers happens after the lock is released.
///
/// # Example
///
/// ```rust
/// use meshwatch_core::{Aggregator, SourceProfile};
///
/// let aggregator = Aggregator::builder()
///     .root(1)
///     .profile(SourceProfile::Simulation)
///     .build()
///     .unwrap();
///
/// let mut viewer = aggregator.subscribe();
/// aggregator.ingest_unit(r#"{"type":"node_data","nodeId":2,"parentNode":1,"temp":21.5}"#);
///
/// assert_eq!(aggregator.nodes().nodes.len(), 1);
/// assert!(viewer.try_recv().is_some()); // init
/// ```
#[derive(Debug, Clone)]
pub struct Aggregator {
    config: Arc<AggregatorConfig>,
    normalizer: Normalizer,
    state: Arc<Mutex<MeshState>>,
    broadcaster: Arc<Broadcaster>,
    sink: Option<Arc<SinkDispatcher>>,
    counters: Arc<IngestCounters>,
}

impl Aggregator {
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Process one transport unit: a serial line or a datagram.
    ///
    /// The unit is mirrored to viewers as a console line, then applied if it
    /// is a recognizable record. Never fails.
    pub fn ingest_unit(&self, unit: &str) -> Applied {
        let unit = unit.trim();
        if unit.is_empty() {
            return Applied::Unchanged;
        }

        let now = current_timestamp_ms();
        self.counters.units.fetch_add(1, Ordering::Relaxed);
        self.broadcast_line(unit, now);

        match classify(unit) {
            Ingress::Record(record) => self.ingest_record(&record, now),
            Ingress::Console(_) => {
                self.counters.console_only.fetch_add(1, Ordering::Relaxed);
                Applied::Unchanged
            }
        }
    }

    /// Normalize a decoded record and apply it.
    pub fn ingest_record(&self, record: &Map<String, Value>, now_ms: u64) -> Applied {
        self.apply(self.normalizer.normalize(record), now_ms)
    }

    /// Apply one event as a single atomic update and notify viewers.
    pub fn apply(&self, event: MeshEvent, now_ms: u64) -> Applied {
        let kind = event.kind();
        let mut reading = None;

        let envelope = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            match event {
                MeshEvent::NodeStatus(status) => {
                    if self.sink.is_some() {
                        reading = Some(SinkReading::from_status(&status));
                    }
                    let record = state.store.upsert(status, now_ms);
                    tracing::info!(
                        node = %record.node_id,
                        parent = ?record.routing.parent.map(NodeId::get),
                        hops = record.routing.hop_distance,
                        rssi = record.routing.rssi,
                        messages = record.message_count,
                        "node update"
                    );
                    state.capture(now_ms);
                }
                MeshEvent::GatewayStatus(status) => {
                    tracing::debug!(uptime = ?status.uptime, free_heap = ?status.free_heap, "gateway status");
                    state.gateway = status;
                }
                MeshEvent::MeshStats(report) => {
                    state.stats.apply_report(&report);
                }
                MeshEvent::Beacon(beacon) => {
                    tracing::debug!(
                        sender = ?beacon.sender.map(NodeId::get),
                        distance = ?beacon.distance,
                        rssi = ?beacon.rssi,
                        "beacon"
                    );
                    return Applied::Unchanged;
                }
                MeshEvent::PacketSent(report) => {
                    state.stats.packets_sent += 1;
                    state
                        .history
                        .record_packet(packet_event(PacketDirection::Sent, report, now_ms));
                }
                MeshEvent::PacketReceived(report) => {
                    state.stats.packets_received += 1;
                    state
                        .history
                        .record_packet(packet_event(PacketDirection::Received, report, now_ms));
                }
                MeshEvent::PacketDropped(report) => {
                    state.stats.packets_dropped += 1;
                    tracing::debug!(
                        node = ?report.node_id.map(NodeId::get),
                        reason = %report.reason,
                        "packet dropped"
                    );
                }
                MeshEvent::Unrecognized(unrecognized) => {
                    self.counters.unrecognized.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        kind = unrecognized.kind.as_deref().unwrap_or("-"),
                        reason = unrecognized.reason.as_str(),
                        "record dropped"
                    );
                    return Applied::Unrecognized;
                }
            }

            state.bump();
            state.envelope(now_ms)
        };

        let revision = envelope.revision;
        self.counters.applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(kind, revision, "event applied");

        if let (Some(sink), Some(reading)) = (&self.sink, reading) {
            sink.offer(reading, now_ms);
        }
        self.deliver(Message::Update(envelope));

        Applied::Changed { revision }
    }

    /// Run one liveness pass at `now_ms`.
    ///
    /// All transitions found in the pass are applied together and announced
    /// with a single broadcast; nothing is sent when nothing flipped.
    pub fn sweep(&self, now_ms: u64) -> Vec<Transition> {
        let (transitions, envelope) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let transitions =
                liveness::sweep(&mut state.store, now_ms, self.config.offline_threshold);
            if transitions.is_empty() {
                return transitions;
            }
            state.capture(now_ms);
            state.bump();
            (transitions, state.envelope(now_ms))
        };

        for transition in &transitions {
            match transition {
                Transition::Offline(id) => tracing::warn!(node = %id, "node offline"),
                Transition::Online(id) => tracing::info!(node = %id, "node back online"),
            }
        }
        self.deliver(Message::Update(envelope));
        transitions
    }

    /// Start the periodic liveness sweep on the current tokio runtime.
    pub fn start(&self) -> LivenessHandle {
        use tokio::sync::watch;
        use tokio::time::MissedTickBehavior;

        let (stop_tx, stop_rx) = watch::channel(false);
        let aggregator = self.clone();
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut stop_rx = stop_rx;

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        aggregator.sweep(current_timestamp_ms());
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("liveness sweep stopped");
        });

        LivenessHandle { stop_tx }
    }

    /// Register a viewer.
    ///
    /// Its queue starts with the full current state followed by the most
    /// recent console lines; later broadcasts follow in order.
    pub fn subscribe(&self) -> Subscription {
        let subscription = self.broadcaster.register(|| {
            let mut state = self.state.lock();
            let mut initial = vec![Message::Init(state.envelope(current_timestamp_ms()))];
            initial.extend(state.console_tail(self.config.console_replay));
            initial
        });
        tracing::info!(subscriber = %subscription.id(), "viewer subscribed");
        subscription
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.broadcaster.deregister(id);
        if removed {
            tracing::info!(subscriber = %id, "viewer unsubscribed");
        }
        removed
    }

    /// Send a command outcome to the viewer that asked.
    pub fn respond(&self, id: SubscriberId, response: CommandResponse) -> bool {
        self.broadcaster
            .send_to(id, Message::CommandResponse(response))
    }

    /// Push the current state to every viewer.
    pub fn broadcast_state(&self) -> Delivery {
        let envelope = self.state.lock().envelope(current_timestamp_ms());
        self.deliver(Message::Update(envelope))
    }

    /// Record a console line and mirror it to every viewer.
    pub fn broadcast_line(&self, line: &str, now_ms: u64) -> Delivery {
        self.state.lock().push_console(line, now_ms);
        self.deliver(Message::Serial {
            line: line.to_string(),
            timestamp_ms: now_ms,
        })
    }

    fn deliver(&self, message: Message) -> Delivery {
        let delivery = self.broadcaster.deliver(message);
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.counters
            .lagged
            .fetch_add(delivery.lagged as u64, Ordering::Relaxed);
        self.counters
            .removed
            .fetch_add(delivery.removed as u64, Ordering::Relaxed);
        delivery
    }

    pub fn state(&self) -> StateResponse {
        let state = self.state.lock();
        StateResponse {
            timestamp_ms: current_timestamp_ms(),
            gateway: state.gateway.clone(),
            nodes: state.store.records().clone(),
            mesh_stats: state.stats.clone(),
        }
    }

    pub fn nodes(&self) -> NodesResponse {
        NodesResponse {
            nodes: self.state.lock().store.records().clone(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<NodeRecord> {
        self.state.lock().store.get(id).cloned()
    }

    pub fn topology(&self) -> TopologyResponse {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let history_count = state.history.len();
        TopologyResponse {
            timestamp_ms: current_timestamp_ms(),
            topology: state.store.topology(history_count),
        }
    }

    pub fn history(&self) -> HistoryResponse {
        let state = self.state.lock();
        HistoryResponse {
            timestamp_ms: current_timestamp_ms(),
            history: state.history.snapshots(),
            packet_events: state.history.packet_events(),
        }
    }

    /// Current state revision.
    pub fn revision(&self) -> u64 {
        self.state.lock().revision()
    }

    /// Number of topology rebuilds so far.
    pub fn topology_rebuilds(&self) -> u64 {
        self.state.lock().store.topology_rebuilds()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.len()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// The sink dispatcher, when a sink is configured.
    pub fn sink(&self) -> Option<&SinkDispatcher> {
        self.sink.as_deref()
    }
}

fn packet_event(direction: PacketDirection, report: PacketReport, now_ms: u64) -> PacketEvent {
    PacketEvent {
        direction,
        from_node: report.from_node,
        to_node: report.to_node,
        packet_type: report.packet_type,
        rssi: report.rssi,
        snr: report.snr,
        seq: report.seq,
        timestamp_ms: now_ms,
    }
}

/// Builder for configuring an [`Aggregator`].
#[derive(Debug, Default)]
pub struct AggregatorBuilder {
    root: Option<u32>,
    profile: Option<SourceProfile>,
    offline_threshold: Option<Duration>,
    sweep_interval: Option<Duration>,
    snapshot_interval: Option<Duration>,
    history_capacity: Option<usize>,
    packet_capacity: Option<usize>,
    console_capacity: Option<usize>,
    console_replay: Option<usize>,
    queue_depth: Option<usize>,
    sink: Option<Arc<dyn TelemetrySink>>,
    sink_interval: Option<Duration>,
    sink_timeout: Option<Duration>,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the root (gateway) node. Defaults to 1.
    pub fn root(mut self, root: u32) -> Self {
        self.root = Some(root);
        self
    }

    /// Kind of upstream. Sets defaults for thresholds and missing fields.
    pub fn profile(mut self, profile: SourceProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn offline_threshold(mut self, threshold: Duration) -> Self {
        self.offline_threshold = Some(threshold);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Minimum spacing between history snapshots. Defaults to 30 seconds.
    pub fn snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity);
        self
    }

    pub fn packet_capacity(mut self, capacity: usize) -> Self {
        self.packet_capacity = Some(capacity);
        self
    }

    pub fn console_capacity(mut self, capacity: usize) -> Self {
        self.console_capacity = Some(capacity);
        self
    }

    /// Console lines replayed to a new viewer. Zero disables the replay.
    pub fn console_replay(mut self, lines: usize) -> Self {
        self.console_replay = Some(lines);
        self
    }

    /// Per-viewer queue depth.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = Some(depth);
        self
    }

    /// Forward node readings to an external service.
    pub fn sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Minimum spacing between uploads for one node. Defaults to 20 seconds.
    pub fn sink_interval(mut self, interval: Duration) -> Self {
        self.sink_interval = Some(interval);
        self
    }

    pub fn sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = Some(timeout);
        self
    }

    /// Validate the settings and build the aggregator.
    pub fn build(self) -> Result<Aggregator, ConfigError> {
        let profile = self.profile.unwrap_or_default();
        let root = NodeId::new(self.root.unwrap_or(1)).ok_or(ConfigError::InvalidRoot)?;

        let config = AggregatorConfig {
            root,
            profile,
            offline_threshold: self
                .offline_threshold
                .unwrap_or_else(|| profile.offline_threshold()),
            sweep_interval: self
                .sweep_interval
                .unwrap_or_else(|| profile.sweep_interval()),
            snapshot_interval: self.snapshot_interval.unwrap_or(DEFAULT_SNAPSHOT_INTERVAL),
            history_capacity: self.history_capacity.unwrap_or(DEFAULT_SNAPSHOT_CAPACITY),
            packet_capacity: self.packet_capacity.unwrap_or(DEFAULT_PACKET_CAPACITY),
            console_capacity: self.console_capacity.unwrap_or(DEFAULT_CONSOLE_CAPACITY),
            console_replay: self.console_replay.unwrap_or(DEFAULT_CONSOLE_REPLAY),
            queue_depth: self.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
        };
        validate(&config)?;

        let sink_interval = self.sink_interval.unwrap_or(DEFAULT_SINK_INTERVAL);
        let sink_timeout = self.sink_timeout.unwrap_or(DEFAULT_SINK_TIMEOUT);
        if sink_interval.is_zero() {
            return Err(ConfigError::ZeroDuration { name: "sink interval" });
        }
        if sink_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { name: "sink timeout" });
        }
        let sink = self
            .sink
            .map(|sink| Arc::new(SinkDispatcher::new(sink, sink_interval, sink_timeout)));

        let state = MeshState::new(
            NodeStore::new(config.root),
            HistoryRecorder::new(
                config.snapshot_interval,
                config.history_capacity,
                config.packet_capacity,
            ),
            config.console_capacity,
        );

        Ok(Aggregator {
            normalizer: Normalizer::new(config.root, config.profile),
            broadcaster: Arc::new(Broadcaster::new(config.queue_depth)),
            state: Arc::new(Mutex::new(state)),
            sink,
            counters: Arc::new(IngestCounters::default()),
            config: Arc::new(config),
        })
    }
}

fn validate(config: &AggregatorConfig) -> Result<(), ConfigError> {
    for (name, duration) in [
        ("offline threshold", config.offline_threshold),
        ("sweep interval", config.sweep_interval),
        ("snapshot interval", config.snapshot_interval),
    ] {
        if duration.is_zero() {
            return Err(ConfigError::ZeroDuration { name });
        }
    }

    for (name, capacity) in [
        ("history", config.history_capacity),
        ("packet", config.packet_capacity),
        ("console", config.console_capacity),
        ("queue", config.queue_depth),
    ] {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name });
        }
    }

    if config.sweep_interval >= config.offline_threshold {
        return Err(ConfigError::SweepTooSlow {
            interval: config.sweep_interval,
            threshold: config.offline_threshold,
        });
    }

    Ok(())
}
