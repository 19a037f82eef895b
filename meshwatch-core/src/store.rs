//! Authoritative per-node state.

use std::collections::BTreeMap;

use meshwatch_types::{NodeId, NodeRecord, TopologyView};

use crate::normalize::NodeStatus;
use crate::topology::TopologyCache;

/// Resolve the parent used for topology edges.
///
/// A missing parent, or one naming the node itself, means the node reported
/// no route. The root then has no parent and every other node is attached to
/// the root. Returns the parent and whether it was imputed.
pub fn effective_parent(
    root: NodeId,
    node: NodeId,
    reported: Option<NodeId>,
) -> (Option<NodeId>, bool) {
    match reported {
        Some(parent) if parent != node => (Some(parent), false),
        _ if node == root => (None, false),
        _ => (Some(root), true),
    }
}

/// Map of node id to record, plus the topology cache derived from it.
///
/// Every method that changes a record invalidates the topology in the same
/// call, so a reader holding `&mut NodeStore` never sees a stale graph.
#[derive(Debug)]
pub struct NodeStore {
    root: NodeId,
    records: BTreeMap<NodeId, NodeRecord>,
    topology: TopologyCache,
}

impl NodeStore {
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            records: BTreeMap::new(),
            topology: TopologyCache::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Apply a status report, creating the record on first sight.
    ///
    /// Telemetry, position and routing are replaced by the report; the
    /// message counter grows by one and the node is online as of `now_ms`.
    pub fn upsert(&mut self, status: NodeStatus, now_ms: u64) -> &NodeRecord {
        let (parent, parent_inferred) =
            effective_parent(self.root, status.node_id, status.reported_parent);

        let record = self
            .records
            .entry(status.node_id)
            .or_insert_with(|| NodeRecord::new(status.node_id, now_ms));

        record.telemetry = status.telemetry;
        record.position = status.position;
        record.counters = status.counters;
        record.is_gateway = status.is_gateway;

        let routing = &mut record.routing;
        routing.parent = parent;
        routing.reported_parent = status.reported_parent;
        routing.parent_inferred = parent_inferred;
        routing.hop_distance = status.hop_distance;
        routing.rssi = status.rssi;
        routing.snr = status.snr;
        routing.time_source = status.time_source;
        routing.neighbor_count = status.neighbor_count;
        routing.next_hop = status.next_hop;
        routing.route_valid = status.route_valid;

        record.message_count += 1;
        record.last_seen = now_ms;
        record.online = true;
        record.offline_since = None;

        self.topology.invalidate();
        record
    }

    /// Mark a node offline. No-op if it is unknown or already offline.
    ///
    /// `offline_since` is set to the last time the node was heard from.
    pub fn mark_offline(&mut self, id: NodeId) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if record.online => {
                record.online = false;
                record.offline_since = Some(record.last_seen);
                self.topology.invalidate();
                true
            }
            _ => false,
        }
    }

    /// Mark a node online. No-op if it is unknown or already online.
    pub fn mark_online(&mut self, id: NodeId) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if !record.online => {
                record.online = true;
                record.offline_since = None;
                self.topology.invalidate();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> &BTreeMap<NodeId, NodeRecord> {
        &self.records
    }

    /// Owned copy of every record, ordered by node id.
    pub fn all_records(&self) -> Vec<NodeRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.records.values().filter(|r| r.online).count()
    }

    /// Topology for the current records; see [`TopologyCache::view`].
    pub fn topology(&mut self, history_count: usize) -> TopologyView {
        self.topology.view(&self.records, history_count)
    }

    pub fn topology_is_dirty(&self) -> bool {
        self.topology.is_dirty()
    }

    pub fn topology_rebuilds(&self) -> u64 {
        self.topology.rebuilds()
    }
}
