// Path: crates/api/src/event.rs
//! Node event publication.
//!
//! Subscribers get a bounded channel per subscription; on backpressure the
//! hub drops the event rather than blocking the publisher. Dead
//! subscriptions are pruned lazily on publish.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Event topics a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// A contract emitted an event entry.
    ContractEvent,
    /// A transaction receipt was finalized.
    ContractReceipt,
    /// A new block reached the cache head.
    NewBlock,
}

/// A published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The topic this event belongs to.
    pub topic: Topic,
    /// JSON payload.
    pub data: String,
    /// Publication time, nanoseconds since epoch.
    pub time: i64,
}

struct Subscriber {
    topics: HashSet<Topic>,
    tx: mpsc::Sender<Event>,
}

/// Fan-out hub for node events.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription for `topics` with a bounded buffer of
    /// `capacity` events.
    pub fn subscribe(&self, topics: &[Topic], capacity: usize) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.lock().push(Subscriber {
            topics: topics.iter().copied().collect(),
            tx,
        });
        rx
    }

    /// Publishes an event to every matching live subscriber. Full buffers
    /// drop the event for that subscriber; closed subscriptions are removed.
    pub fn publish(&self, event: &Event) {
        let mut subs = self.subscribers.lock();
        subs.retain(|sub| {
            if !sub.topics.contains(&event.topic) {
                return !sub.tx.is_closed();
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(target: "event", topic = ?event.topic, "subscriber lagging, event dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// The number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(topic: Topic, data: &str) -> Event {
        Event {
            topic,
            data: data.to_string(),
            time: 0,
        }
    }

    #[tokio::test]
    async fn delivers_to_matching_topics_only() {
        let hub = EventHub::new();
        let mut blocks = hub.subscribe(&[Topic::NewBlock], 8);
        let mut receipts = hub.subscribe(&[Topic::ContractReceipt], 8);

        hub.publish(&ev(Topic::NewBlock, "b1"));
        assert_eq!(blocks.recv().await.unwrap().data, "b1");
        assert!(receipts.try_recv().is_err());
    }

    #[tokio::test]
    async fn drops_on_backpressure_without_blocking() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe(&[Topic::NewBlock], 1);
        hub.publish(&ev(Topic::NewBlock, "first"));
        hub.publish(&ev(Topic::NewBlock, "dropped"));
        assert_eq!(rx.recv().await.unwrap().data, "first");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn prunes_closed_subscribers() {
        let hub = EventHub::new();
        let rx = hub.subscribe(&[Topic::NewBlock], 1);
        drop(rx);
        hub.publish(&ev(Topic::NewBlock, "x"));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
