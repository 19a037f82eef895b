//! Fan-out of messages to subscribed viewers.
//!
//! ```text
//!                        ┌──────────────┐  bounded queue  ┌──────────┐
//!                   ┌───▶│ subscriber 1 │────────────────▶│ viewer 1 │
//! ┌─────────────┐   │    └──────────────┘                 └──────────┘
//! │ Broadcaster │───┤    ┌──────────────┐                 ┌──────────┐
//! └─────────────┘   └───▶│ subscriber 2 │──── (full) ────▶│ viewer 2 │
//!                        └──────────────┘   dropped       └──────────┘
//! ```
//!
//! Delivery never waits on a viewer: every send is a `try_send`. A full
//! queue loses that one message for that one viewer, and a closed queue
//! removes the viewer once the current delivery pass completes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use meshwatch_types::Message;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Identifies one subscribed viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Result of one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Subscribers whose queue was full; they miss this message.
    pub lagged: usize,
    /// Subscribers removed because their receiving side was gone.
    pub removed: usize,
}

/// Registry of subscribers and their queues.
#[derive(Debug)]
pub struct Broadcaster {
    subscribers: Mutex<BTreeMap<SubscriberId, mpsc::Sender<Arc<Message>>>>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl Broadcaster {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register a subscriber whose queue starts with `initial()`.
    ///
    /// `initial` runs while the registry is locked, so no delivery can reach
    /// the new subscriber before its initial messages.
    pub fn register<F>(&self, initial: F) -> Subscription
    where
        F: FnOnce() -> Vec<Message>,
    {
        let mut subscribers = self.subscribers.lock();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let initial = initial();
        let (tx, rx) = mpsc::channel(self.queue_depth + initial.len());
        for message in initial {
            // Capacity covers every initial message.
            let _ = tx.try_send(Arc::new(message));
        }
        subscribers.insert(id, tx);

        Subscription {
            id,
            rx,
            last_revision: None,
        }
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    /// Offer `message` to every subscriber without waiting.
    pub fn deliver(&self, message: Message) -> Delivery {
        let message = Arc::new(message);
        let mut subscribers = self.subscribers.lock();
        let mut delivery = Delivery::default();
        let mut failed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = %id, "subscriber queue full, message dropped");
                    delivery.lagged += 1;
                }
                Err(TrySendError::Closed(_)) => failed.push(*id),
            }
        }

        for id in failed {
            subscribers.remove(&id);
            tracing::info!(subscriber = %id, "subscriber disconnected, removed");
            delivery.removed += 1;
        }

        delivery
    }

    /// Deliver `message` to a single subscriber.
    pub fn send_to(&self, id: SubscriberId, message: Message) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(tx) = subscribers.get(&id) else {
            return false;
        };

        match tx.try_send(Arc::new(message)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => {
                subscribers.remove(&id);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

/// Receiving side of one subscriber.
///
/// State envelopes are yielded in increasing revision order: an envelope no
/// newer than one already yielded is skipped.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<Message>>,
    last_revision: Option<u64>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message. `None` once the subscriber was removed.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        loop {
            let message = self.rx.recv().await?;
            if self.accept(&message) {
                return Some(message);
            }
        }
    }

    /// Next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        loop {
            let message = self.rx.try_recv().ok()?;
            if self.accept(&message) {
                return Some(message);
            }
        }
    }

    fn accept(&mut self, message: &Message) -> bool {
        let Some(revision) = message.revision() else {
            return true;
        };
        if matches!(self.last_revision, Some(last) if revision <= last) {
            return false;
        }
        self.last_revision = Some(revision);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_types::{
        GatewayStatus, MeshStats, SchemaVersion, StateEnvelope, TopologyView,
    };

    fn update(revision: u64) -> Message {
        Message::Update(StateEnvelope {
            version: SchemaVersion::current(),
            revision,
            timestamp_ms: revision,
            gateway: GatewayStatus::default(),
            nodes: BTreeMap::new(),
            mesh_stats: MeshStats::default(),
            topology: TopologyView::empty(),
        })
    }

    fn line(text: &str) -> Message {
        Message::Serial {
            line: text.to_string(),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn initial_messages_come_first() {
        let broadcaster = Broadcaster::default();
        let mut sub = broadcaster.register(|| vec![update(3), line("boot")]);
        broadcaster.deliver(update(4));

        assert_eq!(sub.try_recv().unwrap().revision(), Some(3));
        assert_eq!(*sub.try_recv().unwrap(), line("boot"));
        assert_eq!(sub.try_recv().unwrap().revision(), Some(4));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn closed_subscriber_is_removed_and_others_still_receive() {
        let broadcaster = Broadcaster::default();
        let mut a = broadcaster.register(Vec::new);
        let b = broadcaster.register(Vec::new);
        let mut c = broadcaster.register(Vec::new);
        drop(b);

        let delivery = broadcaster.deliver(update(1));

        assert_eq!(delivery.delivered, 2);
        assert_eq!(delivery.removed, 1);
        assert_eq!(broadcaster.len(), 2);
        assert!(a.try_recv().is_some());
        assert!(c.try_recv().is_some());
    }

    #[test]
    fn full_queue_drops_only_for_that_subscriber() {
        let broadcaster = Broadcaster::new(2);
        let mut slow = broadcaster.register(Vec::new);
        let mut fast = broadcaster.register(Vec::new);

        broadcaster.deliver(update(1));
        broadcaster.deliver(update(2));
        assert!(fast.try_recv().is_some());
        assert!(fast.try_recv().is_some());

        let delivery = broadcaster.deliver(update(3));
        assert_eq!(delivery.lagged, 1);
        assert_eq!(delivery.delivered, 1);
        assert_eq!(broadcaster.len(), 2);

        assert_eq!(fast.try_recv().unwrap().revision(), Some(3));
        assert_eq!(slow.try_recv().unwrap().revision(), Some(1));
        assert_eq!(slow.try_recv().unwrap().revision(), Some(2));
        assert!(slow.try_recv().is_none());
    }

    #[test]
    fn stale_state_is_never_yielded() {
        let broadcaster = Broadcaster::default();
        let mut sub = broadcaster.register(|| vec![update(5)]);
        broadcaster.deliver(update(4));
        broadcaster.deliver(line("between"));
        broadcaster.deliver(update(5));
        broadcaster.deliver(update(7));

        assert_eq!(sub.try_recv().unwrap().revision(), Some(5));
        assert_eq!(*sub.try_recv().unwrap(), line("between"));
        assert_eq!(sub.try_recv().unwrap().revision(), Some(7));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn send_to_targets_one_subscriber() {
        let broadcaster = Broadcaster::default();
        let mut a = broadcaster.register(Vec::new);
        let mut b = broadcaster.register(Vec::new);

        assert!(broadcaster.send_to(a.id(), line("only a")));
        assert_eq!(*a.try_recv().unwrap(), line("only a"));
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn deregister_twice_is_safe() {
        let broadcaster = Broadcaster::default();
        let sub = broadcaster.register(Vec::new);

        assert!(broadcaster.deregister(sub.id()));
        assert!(!broadcaster.deregister(sub.id()));
        assert!(!broadcaster.send_to(sub.id(), line("gone")));
        assert!(broadcaster.is_empty());
    }

    #[tokio::test]
    async fn recv_ends_when_deregistered() {
        let broadcaster = Broadcaster::default();
        let mut sub = broadcaster.register(|| vec![line("hello")]);
        broadcaster.deregister(sub.id());

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
