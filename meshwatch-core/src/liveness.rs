//! Online/offline detection by silence.

use std::time::Duration;

use meshwatch_types::NodeId;

use crate::store::NodeStore;

/// A node flipping liveness state during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Offline(NodeId),
    Online(NodeId),
}

impl Transition {
    pub fn node_id(&self) -> NodeId {
        match self {
            Transition::Offline(id) | Transition::Online(id) => *id,
        }
    }
}

/// Evaluate every record against the silence threshold.
///
/// A node silent for longer than `threshold` goes offline; an offline node
/// heard from within the threshold comes back. Nodes already in the right
/// state are untouched.
pub fn sweep(store: &mut NodeStore, now_ms: u64, threshold: Duration) -> Vec<Transition> {
    let threshold_ms = threshold.as_millis() as u64;

    let due: Vec<Transition> = store
        .records()
        .values()
        .filter_map(|record| {
            let silent = record.silence_ms(now_ms) > threshold_ms;
            match (silent, record.online) {
                (true, true) => Some(Transition::Offline(record.node_id)),
                (false, false) => Some(Transition::Online(record.node_id)),
                _ => None,
            }
        })
        .collect();

    due.into_iter()
        .filter(|transition| match *transition {
            Transition::Offline(id) => store.mark_offline(id),
            Transition::Online(id) => store.mark_online(id),
        })
        .collect()
}

/// Handle for the background liveness task.
///
/// Call `stop()` to end the task; dropping the handle also stops it.
pub struct LivenessHandle {
    pub(crate) stop_tx: tokio::sync::watch::Sender<bool>,
}

impl LivenessHandle {
    /// Stop sweeping.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{id, status};

    const THRESHOLD: Duration = Duration::from_secs(10);

    #[test]
    fn silent_node_goes_offline_once() {
        let mut store = NodeStore::new(id(1));
        store.upsert(status(2, Some(1)), 0);

        assert!(sweep(&mut store, 10_000, THRESHOLD).is_empty());
        assert_eq!(
            sweep(&mut store, 11_000, THRESHOLD),
            vec![Transition::Offline(id(2))]
        );
        assert!(sweep(&mut store, 12_000, THRESHOLD).is_empty());

        let record = store.get(id(2)).unwrap();
        assert!(!record.online);
        assert_eq!(record.offline_since, Some(0));
    }

    #[test]
    fn only_silent_nodes_flip() {
        let mut store = NodeStore::new(id(1));
        store.upsert(status(2, Some(1)), 0);
        store.upsert(status(3, Some(1)), 8_000);

        let transitions = sweep(&mut store, 15_000, THRESHOLD);

        assert_eq!(transitions, vec![Transition::Offline(id(2))]);
        assert!(store.get(id(3)).unwrap().online);
    }

    #[test]
    fn offline_node_within_threshold_comes_back() {
        let mut store = NodeStore::new(id(1));
        store.upsert(status(2, Some(1)), 20_000);
        store.mark_offline(id(2));

        assert_eq!(
            sweep(&mut store, 25_000, THRESHOLD),
            vec![Transition::Online(id(2))]
        );
        assert!(store.get(id(2)).unwrap().online);
    }

    #[test]
    fn empty_store_yields_nothing() {
        let mut store = NodeStore::new(id(1));
        assert!(sweep(&mut store, 1_000_000, THRESHOLD).is_empty());
    }
}
