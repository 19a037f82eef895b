//! Bounded history of topology snapshots and packet events.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use meshwatch_types::{NodeId, NodeRecord, PacketEvent, TopologySnapshot};

/// Default minimum spacing between snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of snapshots retained.
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 100;

/// Default number of packet events retained.
pub const DEFAULT_PACKET_CAPACITY: usize = 100;

/// Rate-limited snapshot ring plus an ungated packet-event ring.
///
/// Both rings evict their oldest entry once full.
#[derive(Debug)]
pub struct HistoryRecorder {
    snapshots: VecDeque<Arc<TopologySnapshot>>,
    packets: VecDeque<PacketEvent>,
    last_capture_ms: Option<u64>,
    snapshot_interval_ms: u64,
    snapshot_capacity: usize,
    packet_capacity: usize,
}

impl HistoryRecorder {
    pub fn new(snapshot_interval: Duration, snapshot_capacity: usize, packet_capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(snapshot_capacity),
            packets: VecDeque::with_capacity(packet_capacity),
            last_capture_ms: None,
            snapshot_interval_ms: snapshot_interval.as_millis() as u64,
            snapshot_capacity,
            packet_capacity,
        }
    }

    /// Capture a snapshot unless the previous one is too recent.
    ///
    /// The first call always captures. Returns whether a snapshot was taken.
    pub fn maybe_capture(&mut self, records: &BTreeMap<NodeId, NodeRecord>, now_ms: u64) -> bool {
        if let Some(last) = self.last_capture_ms {
            if now_ms.saturating_sub(last) < self.snapshot_interval_ms {
                return false;
            }
        }

        self.snapshots.push_back(Arc::new(TopologySnapshot {
            timestamp_ms: now_ms,
            nodes: records.clone(),
        }));
        if self.snapshots.len() > self.snapshot_capacity {
            self.snapshots.pop_front();
        }
        self.last_capture_ms = Some(now_ms);
        true
    }

    pub fn record_packet(&mut self, event: PacketEvent) {
        self.packets.push_back(event);
        if self.packets.len() > self.packet_capacity {
            self.packets.pop_front();
        }
    }

    /// Snapshots, oldest first.
    pub fn snapshots(&self) -> Vec<Arc<TopologySnapshot>> {
        self.snapshots.iter().cloned().collect()
    }

    /// Packet events, oldest first.
    pub fn packet_events(&self) -> Vec<PacketEvent> {
        self.packets.iter().cloned().collect()
    }

    /// The `n` most recent packet events, oldest first.
    pub fn recent_packets(&self, n: usize) -> Vec<PacketEvent> {
        let skip = self.packets.len().saturating_sub(n);
        self.packets.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<&Arc<TopologySnapshot>> {
        self.snapshots.back()
    }

    /// Number of snapshots held.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new(
            DEFAULT_SNAPSHOT_INTERVAL,
            DEFAULT_SNAPSHOT_CAPACITY,
            DEFAULT_PACKET_CAPACITY,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_types::PacketDirection;

    fn nodes(count: u32) -> BTreeMap<NodeId, NodeRecord> {
        (1..=count)
            .filter_map(NodeId::new)
            .map(|id| (id, NodeRecord::new(id, 0)))
            .collect()
    }

    fn packet(seq: u64) -> PacketEvent {
        PacketEvent {
            direction: PacketDirection::Sent,
            from_node: NodeId::new(2),
            to_node: None,
            packet_type: "DATA".to_string(),
            rssi: -50.0,
            snr: None,
            seq,
            timestamp_ms: seq,
        }
    }

    #[test]
    fn first_capture_always_passes() {
        let mut history = HistoryRecorder::default();
        assert!(history.maybe_capture(&nodes(2), 0));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn captures_are_rate_limited() {
        let mut history = HistoryRecorder::default();
        assert!(history.maybe_capture(&nodes(1), 100_000));
        assert!(!history.maybe_capture(&nodes(1), 110_000));
        assert!(!history.maybe_capture(&nodes(1), 129_999));
        assert!(history.maybe_capture(&nodes(1), 130_000));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn ring_keeps_most_recent_hundred() {
        let mut history = HistoryRecorder::default();
        for i in 0..101u64 {
            assert!(history.maybe_capture(&nodes(1), i * 30_000));
        }

        assert_eq!(history.len(), 100);
        let snapshots = history.snapshots();
        assert_eq!(snapshots[0].timestamp_ms, 30_000);
        assert_eq!(snapshots[99].timestamp_ms, 100 * 30_000);
    }

    #[test]
    fn snapshots_are_deep_copies() {
        let mut history = HistoryRecorder::default();
        let mut records = nodes(2);
        history.maybe_capture(&records, 0);

        if let Some(record) = records.values_mut().next() {
            record.online = false;
        }

        let snapshot = history.latest().unwrap();
        assert_eq!(snapshot.online_count(), 2);
    }

    #[test]
    fn packet_ring_is_ungated_and_bounded() {
        let mut history = HistoryRecorder::new(DEFAULT_SNAPSHOT_INTERVAL, 10, 3);
        for seq in 0..5 {
            history.record_packet(packet(seq));
        }

        let seqs: Vec<_> = history.packet_events().iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);

        let recent: Vec<_> = history.recent_packets(2).iter().map(|p| p.seq).collect();
        assert_eq!(recent, vec![3, 4]);
        assert_eq!(history.recent_packets(10).len(), 3);
    }
}
