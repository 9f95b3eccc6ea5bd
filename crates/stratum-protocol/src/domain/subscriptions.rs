//! # Subscription Queues
//!
//! One bounded FIFO per topic (the subscribe method name). The read loop
//! pushes notifications; a consumer pulls them with `recv`. A full queue
//! blocks the pusher, which throttles the read loop to the slowest consumer.
//!
//! On shutdown a `Sentinel` is queued behind any pending notifications.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use super::message::{ResponseFuture, StratumMessage};

struct QueueInner {
    topic: String,
    capacity: usize,
    sender: mpsc::Sender<StratumMessage>,
    receiver: Mutex<mpsc::Receiver<StratumMessage>>,
}

/// Handle to a topic queue. Clones share the same queue.
#[derive(Clone)]
pub struct SubscriptionStream {
    inner: Arc<QueueInner>,
}

impl SubscriptionStream {
    /// Create a queue holding at most `capacity` messages.
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            inner: Arc::new(QueueInner {
                topic: topic.into(),
                capacity,
                sender,
                receiver: Mutex::new(receiver),
            }),
        }
    }

    /// Topic this queue serves.
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Wait for the next message.
    ///
    /// Consumers must treat `Sentinel` as end-of-stream.
    pub async fn recv(&self) -> StratumMessage {
        let mut receiver = self.inner.receiver.lock().await;
        receiver.recv().await.unwrap_or(StratumMessage::Sentinel)
    }

    /// Take the next message if one is queued.
    pub fn try_recv(&self) -> Option<StratumMessage> {
        let mut receiver = self.inner.receiver.try_lock().ok()?;
        receiver.try_recv().ok()
    }

    /// Queue a message, waiting while the queue is full.
    pub async fn push(&self, message: StratumMessage) {
        // The receiver lives as long as `inner`, so send only fails if the
        // queue was closed, which never happens.
        let _ = self.inner.sender.send(message).await;
    }

    /// Queue a message if there is room.
    pub fn try_push(&self, message: StratumMessage) -> bool {
        self.inner.sender.try_send(message).is_ok()
    }

    /// Messages currently queued.
    pub fn len(&self) -> usize {
        self.inner.capacity - self.inner.sender.capacity()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SubscriptionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("topic", &self.inner.topic)
            .field("queued", &self.len())
            .finish()
    }
}

/// Result of a subscribe call.
#[derive(Debug)]
pub struct Subscription {
    /// Request id of the subscribe call.
    pub id: u64,
    /// Reply to the subscribe call, carrying the current status.
    pub ack: ResponseFuture,
    /// Queue of later notifications for the topic.
    pub stream: SubscriptionStream,
}

/// Topic name to queue.
pub struct SubscriptionRegistry {
    queues: DashMap<String, SubscriptionStream>,
    capacity: usize,
}

impl SubscriptionRegistry {
    /// Create a registry whose queues hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Queue for `topic`, created on first use.
    pub fn ensure(&self, topic: &str) -> SubscriptionStream {
        self.queues
            .entry(topic.to_string())
            .or_insert_with(|| SubscriptionStream::new(topic, self.capacity))
            .clone()
    }

    /// Queue for `topic`, if one exists.
    pub fn get(&self, topic: &str) -> Option<SubscriptionStream> {
        self.queues.get(topic).map(|queue| queue.clone())
    }

    /// Every queue.
    pub fn all(&self) -> Vec<SubscriptionStream> {
        self.queues.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of topics.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// True if no topic was ever subscribed.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note(n: u64) -> StratumMessage {
        StratumMessage::Notification {
            method: "blockchain.headers.subscribe".into(),
            params: vec![json!({ "block_height": n })],
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = SubscriptionStream::new("t", 4);
        queue.push(note(1)).await;
        queue.push(note(2)).await;
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.recv().await, note(1));
        assert_eq!(queue.recv().await, note(2));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_try_push() {
        let queue = SubscriptionStream::new("t", 2);
        assert!(queue.try_push(note(1)));
        assert!(queue.try_push(note(2)));
        assert!(!queue.try_push(note(3)));
    }

    #[tokio::test]
    async fn test_push_blocks_until_drained() {
        let queue = SubscriptionStream::new("t", 1);
        queue.push(note(1)).await;

        let pusher = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(StratumMessage::Sentinel).await })
        };
        tokio::task::yield_now().await;
        assert!(!pusher.is_finished());

        assert_eq!(queue.recv().await, note(1));
        pusher.await.unwrap();
        assert!(queue.recv().await.is_sentinel());
    }

    #[test]
    fn test_registry_shares_queue_per_topic() {
        let registry = SubscriptionRegistry::new(10);
        let a = registry.ensure("blockchain.headers.subscribe");
        let b = registry.ensure("blockchain.headers.subscribe");
        assert!(a.try_push(note(1)));
        assert_eq!(b.try_recv(), Some(note(1)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("other").is_none());
    }
}
