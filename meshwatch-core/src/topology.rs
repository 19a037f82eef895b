//! Memoized parent/child graph.
//!
//! Rebuilding the edge list is a full pass over every node, while reads
//! happen on every broadcast and every query. The cache turns repeated reads
//! between changes into an `Arc` clone.

use std::collections::BTreeMap;
use std::sync::Arc;

use meshwatch_types::{NodeId, NodeRecord, TopologyEdge, TopologyGraph, TopologyView};

/// Build nodes and edges from the current records.
///
/// A record contributes an edge when it has a parent that is not itself.
pub fn build_graph(records: &BTreeMap<NodeId, NodeRecord>) -> TopologyGraph {
    let mut edges = Vec::new();
    for record in records.values() {
        if let Some(parent) = record.routing.parent {
            if parent != record.node_id {
                edges.push(TopologyEdge {
                    from: record.node_id,
                    to: parent,
                    rssi: record.routing.rssi,
                });
            }
        }
    }

    TopologyGraph {
        nodes: records.values().cloned().collect(),
        edges,
    }
}

/// Cached topology plus the flag saying it is stale.
#[derive(Debug)]
pub struct TopologyCache {
    graph: Option<Arc<TopologyGraph>>,
    dirty: bool,
    rebuilds: u64,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self {
            graph: None,
            dirty: true,
            rebuilds: 0,
        }
    }

    /// Mark the cache stale. Only node store mutators call this.
    pub(crate) fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of full rebuilds performed so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Current view, rebuilding only if something changed since the last call.
    ///
    /// `history_count` is cheap and always refreshed.
    pub fn view(
        &mut self,
        records: &BTreeMap<NodeId, NodeRecord>,
        history_count: usize,
    ) -> TopologyView {
        let graph = match &self.graph {
            Some(graph) if !self.dirty => graph.clone(),
            _ => {
                let graph = Arc::new(build_graph(records));
                self.graph = Some(graph.clone());
                self.dirty = false;
                self.rebuilds += 1;
                graph
            }
        };

        TopologyView {
            graph,
            history_count,
        }
    }
}

impl Default for TopologyCache {
    fn default() -> Self {
        Self::new()
    }
}
