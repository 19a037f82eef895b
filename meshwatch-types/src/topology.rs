//! Parent/child topology and point-in-time history entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{NodeId, NodeRecord};

/// A directed link from a node to the parent it routes through.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TopologyEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// Signal strength reported by `from`, in dBm.
    pub rssi: f64,
}

/// Node list plus derived edges.
///
/// Built once per change to the node set and shared through an `Arc`
/// between every reader until the next change.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TopologyGraph {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<TopologyEdge>,
}

impl TopologyGraph {
    /// Edges pointing at `parent`.
    pub fn children_of(&self, parent: NodeId) -> impl Iterator<Item = &TopologyEdge> {
        self.edges.iter().filter(move |edge| edge.to == parent)
    }
}

/// Topology as handed to viewers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TopologyView {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub graph: Arc<TopologyGraph>,

    /// Number of snapshots currently held in history.
    pub history_count: usize,
}

impl TopologyView {
    pub fn empty() -> Self {
        Self {
            graph: Arc::new(TopologyGraph::default()),
            history_count: 0,
        }
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.graph.nodes
    }

    pub fn edges(&self) -> &[TopologyEdge] {
        &self.graph.edges
    }
}

impl Default for TopologyView {
    fn default() -> Self {
        Self::empty()
    }
}

/// Deep copy of every node record at one instant.
///
/// Snapshots are immutable once captured.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TopologySnapshot {
    pub timestamp_ms: u64,
    pub nodes: BTreeMap<NodeId, NodeRecord>,
}

impl TopologySnapshot {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes that were online when the snapshot was taken.
    pub fn online_count(&self) -> usize {
        self.nodes.values().filter(|n| n.online).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    #[test]
    fn children_of_filters_by_parent() {
        let graph = TopologyGraph {
            nodes: Vec::new(),
            edges: vec![
                TopologyEdge { from: id(2), to: id(1), rssi: -70.0 },
                TopologyEdge { from: id(3), to: id(2), rssi: -80.0 },
                TopologyEdge { from: id(4), to: id(1), rssi: -60.0 },
            ],
        };

        let children: Vec<_> = graph.children_of(id(1)).map(|e| e.from).collect();
        assert_eq!(children, vec![id(2), id(4)]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_map_keys_are_strings() {
        let mut nodes = BTreeMap::new();
        nodes.insert(id(12), NodeRecord::new(id(12), 5));
        let snapshot = TopologySnapshot { timestamp_ms: 5, nodes };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["nodes"].get("12").is_some());
        assert_eq!(json["timestampMs"], 5);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn view_flattens_graph() {
        let view = TopologyView {
            graph: Arc::new(TopologyGraph {
                nodes: vec![NodeRecord::new(id(1), 0)],
                edges: Vec::new(),
            }),
            history_count: 3,
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["nodes"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["historyCount"], 3);
    }
}
