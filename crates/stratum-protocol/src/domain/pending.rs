//! Pending Call Table - maps request ids to waiting callers.
//!
//! Flow:
//! 1. The client takes the connection lock and assigns the next id
//! 2. `register()` stores a oneshot sender under that id
//! 3. The request line is written; the lock is released
//! 4. The read loop calls `take()` on the reply and resolves the caller
//! 5. On shutdown `fail_all()` resolves everything left with an error
//!
//! Entries are removed before they are resolved, so each call resolves at
//! most once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::errors::ClientError;
use super::message::StratumMessage;

/// Sender half held for a waiting call.
pub(crate) type ReplySender = oneshot::Sender<Result<StratumMessage, ClientError>>;

/// A pending entry.
pub(crate) enum PendingCall {
    /// A caller awaiting a `ResponseFuture`.
    Caller {
        sender: ReplySender,
        method: String,
        created_at: Instant,
    },
    /// A subscription re-issued on reconnect. Nobody awaits it; the ack is
    /// delivered into the topic queue instead.
    Resubscribe {
        method: String,
        param: Option<String>,
        created_at: Instant,
    },
}

impl PendingCall {
    fn method(&self) -> &str {
        match self {
            PendingCall::Caller { method, .. } | PendingCall::Resubscribe { method, .. } => method,
        }
    }
}

/// Statistics for the pending call table.
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total calls registered.
    pub total_registered: AtomicU64,
    /// Total replies matched to a pending call.
    pub total_completed: AtomicU64,
    /// Total calls failed by shutdown or write errors.
    pub total_failed: AtomicU64,
    /// Total replies whose id matched nothing.
    pub total_unknown: AtomicU64,
}

/// Table of outstanding calls keyed by request id.
#[derive(Default)]
pub struct PendingCalls {
    pending: DashMap<u64, PendingCall>,
    stats: PendingStats,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller and get the receiver its reply will arrive on.
    pub(crate) fn register(
        &self,
        id: u64,
        method: &str,
    ) -> oneshot::Receiver<Result<StratumMessage, ClientError>> {
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall::Caller {
                sender,
                method: method.to_string(),
                created_at: Instant::now(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "Registered pending call");
        receiver
    }

    /// Register a re-issued subscription whose ack goes to the topic queue.
    pub(crate) fn register_resubscription(&self, id: u64, method: &str, param: Option<String>) {
        self.pending.insert(
            id,
            PendingCall::Resubscribe {
                method: method.to_string(),
                param,
                created_at: Instant::now(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "Registered resubscription");
    }

    /// Remove and return the entry for a reply.
    pub(crate) fn take(&self, id: u64) -> Option<PendingCall> {
        match self.pending.remove(&id) {
            Some((_, call)) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                let elapsed = match &call {
                    PendingCall::Caller { created_at, .. }
                    | PendingCall::Resubscribe { created_at, .. } => created_at.elapsed(),
                };
                debug!(
                    id,
                    method = call.method(),
                    response_time_ms = elapsed.as_millis() as u64,
                    "Matched reply"
                );
                Some(call)
            }
            None => {
                self.stats.total_unknown.fetch_add(1, Ordering::Relaxed);
                warn!(id, "Reply for unknown request id");
                None
            }
        }
    }

    /// Drop an entry whose request never reached the wire.
    pub(crate) fn discard(&self, id: u64) {
        if self.pending.remove(&id).is_some() {
            self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fail every pending call with `error`.
    ///
    /// Returns the number of entries removed.
    pub fn fail_all(&self, error: &ClientError) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, call)) = self.pending.remove(&id) {
                if let PendingCall::Caller { sender, .. } = call {
                    let _ = sender.send(Err(error.clone()));
                }
                failed += 1;
            }
        }
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        if failed > 0 {
            debug!(failed, error = %error, "Failed pending calls");
        }
        failed
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check whether `id` is outstanding.
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Get statistics.
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(id: u64) -> StratumMessage {
        StratumMessage::Result {
            id,
            result: json!(id),
        }
    }

    #[tokio::test]
    async fn test_register_and_take() {
        let table = PendingCalls::new();
        let rx = table.register(1000, "server.version");
        assert!(table.is_pending(1000));

        match table.take(1000) {
            Some(PendingCall::Caller { sender, .. }) => sender.send(Ok(reply(1000))).unwrap(),
            _ => panic!("expected caller"),
        }
        assert_eq!(rx.await.unwrap().unwrap(), reply(1000));
        assert!(table.is_empty());
        assert_eq!(table.stats().total_completed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_take_is_at_most_once() {
        let table = PendingCalls::new();
        let _rx = table.register(5, "m");
        assert!(table.take(5).is_some());
        assert!(table.take(5).is_none());
        assert_eq!(table.stats().total_unknown.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = PendingCalls::new();
        let a = table.register(1, "a");
        let b = table.register(2, "b");
        table.register_resubscription(3, "blockchain.headers.subscribe", None);

        let failed = table.fail_all(&ClientError::ConnectionClosed("shutting down".into()));
        assert_eq!(failed, 3);
        assert!(table.is_empty());
        assert!(matches!(a.await.unwrap(), Err(ClientError::ConnectionClosed(_))));
        assert!(matches!(b.await.unwrap(), Err(ClientError::ConnectionClosed(_))));
    }

    #[test]
    fn test_discard() {
        let table = PendingCalls::new();
        let _rx = table.register(9, "m");
        table.discard(9);
        assert!(!table.is_pending(9));
        assert_eq!(table.stats().total_failed.load(Ordering::Relaxed), 1);
    }
}
