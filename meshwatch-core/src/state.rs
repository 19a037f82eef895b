//! The shared model guarded by the aggregator's single lock.

use std::collections::VecDeque;

use meshwatch_types::{
    GatewayStatus, MeshStats, Message, SchemaVersion, StateEnvelope,
};

use crate::history::HistoryRecorder;
use crate::store::NodeStore;

#[derive(Debug)]
struct ConsoleLine {
    text: String,
    timestamp_ms: u64,
}

/// Everything viewers can observe.
///
/// Mutations go through `&mut MeshState` while the aggregator lock is held,
/// and each one that changes observable state calls [`MeshState::bump`].
#[derive(Debug)]
pub(crate) struct MeshState {
    pub store: NodeStore,
    pub history: HistoryRecorder,
    pub gateway: GatewayStatus,
    pub stats: MeshStats,
    console: VecDeque<ConsoleLine>,
    console_capacity: usize,
    revision: u64,
}

impl MeshState {
    pub fn new(store: NodeStore, history: HistoryRecorder, console_capacity: usize) -> Self {
        Self {
            store,
            history,
            gateway: GatewayStatus::default(),
            stats: MeshStats::default(),
            console: VecDeque::with_capacity(console_capacity),
            console_capacity,
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Advance the revision after a mutation.
    pub fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Snapshot history if the recorder's spacing allows it.
    pub fn capture(&mut self, now_ms: u64) -> bool {
        self.history.maybe_capture(self.store.records(), now_ms)
    }

    /// Full state at the current revision.
    pub fn envelope(&mut self, now_ms: u64) -> StateEnvelope {
        let history_count = self.history.len();
        StateEnvelope {
            version: SchemaVersion::current(),
            revision: self.revision,
            timestamp_ms: now_ms,
            gateway: self.gateway.clone(),
            nodes: self.store.records().clone(),
            mesh_stats: self.stats.clone(),
            topology: self.store.topology(history_count),
        }
    }

    pub fn push_console(&mut self, text: &str, timestamp_ms: u64) {
        self.console.push_back(ConsoleLine {
            text: text.to_string(),
            timestamp_ms,
        });
        if self.console.len() > self.console_capacity {
            self.console.pop_front();
        }
    }

    /// The `n` most recent console lines as viewer messages, oldest first.
    pub fn console_tail(&self, n: usize) -> Vec<Message> {
        let skip = self.console.len().saturating_sub(n);
        self.console
            .iter()
            .skip(skip)
            .map(|line| Message::Serial {
                line: line.text.clone(),
                timestamp_ms: line.timestamp_ms,
            })
            .collect()
    }

    pub fn console_len(&self) -> usize {
        self.console.len()
    }
}
