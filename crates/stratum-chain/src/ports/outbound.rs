//! # Outbound Ports
//!
//! The synchronizer's view of a Stratum server.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::BlockHeader;
use stratum_protocol::{ClientError, ResponseFuture, StratumMessage, SubscriptionStream};

use crate::domain::ChainError;

/// Header source - outbound port.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    /// Queue header notifications arrive on. Owned by the source; the
    /// synchronizer only reads it.
    fn headers_stream(&self) -> SubscriptionStream;

    /// Subscribe to header tips. The ack carries the current tip.
    async fn subscribe_headers(&self) -> ResponseFuture;

    /// Header at `height`, `None` if the server has none there.
    async fn get_header(&self, height: u64) -> Result<Option<BlockHeader>, ChainError>;

    /// Headers of chunk `index`, starting at height `index * interval`.
    async fn get_chunk(&self, index: u64) -> Result<Vec<BlockHeader>, ChainError>;
}

/// In-memory header source for tests.
pub struct MockHeaderSource {
    /// Server chain from height 0.
    chain: Mutex<Vec<BlockHeader>>,
    /// Chunk size.
    interval: u64,
    /// Header notification queue.
    stream: SubscriptionStream,
    /// Chunk indexes requested, in order.
    chunk_requests: Mutex<Vec<u64>>,
    /// Single-header heights requested, in order.
    header_requests: Mutex<Vec<u64>>,
    /// Number of upcoming calls that fail.
    fail_calls: AtomicUsize,
}

impl MockHeaderSource {
    /// Source serving `chain` (height 0 first) in chunks of `interval`.
    pub fn new(chain: Vec<BlockHeader>, interval: u64) -> Self {
        Self {
            chain: Mutex::new(chain),
            interval,
            stream: SubscriptionStream::new("blockchain.headers.subscribe", 16),
            chunk_requests: Mutex::new(Vec::new()),
            header_requests: Mutex::new(Vec::new()),
            fail_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the served chain (simulates a reorg on the server).
    pub fn set_chain(&self, chain: Vec<BlockHeader>) {
        *self.chain.lock() = chain;
    }

    /// Height of the served tip.
    pub fn tip_height(&self) -> u64 {
        self.chain.lock().len().saturating_sub(1) as u64
    }

    /// Tip notification as the server would push it.
    pub fn tip_notification(&self) -> StratumMessage {
        StratumMessage::Notification {
            method: "blockchain.headers.subscribe".to_string(),
            params: vec![self.tip_json()],
        }
    }

    /// Push a tip notification.
    pub async fn announce_tip(&self) {
        self.stream.push(self.tip_notification()).await;
    }

    /// Push the end-of-stream sentinel.
    pub async fn close(&self) {
        self.stream.push(StratumMessage::Sentinel).await;
    }

    /// Make the next `count` calls fail with a connection error.
    pub fn fail_next_calls(&self, count: usize) {
        self.fail_calls.store(count, Ordering::SeqCst);
    }

    /// Chunk indexes requested so far.
    pub fn chunk_requests(&self) -> Vec<u64> {
        self.chunk_requests.lock().clone()
    }

    /// Single-header heights requested so far.
    pub fn header_requests(&self) -> Vec<u64> {
        self.header_requests.lock().clone()
    }

    fn tip_json(&self) -> serde_json::Value {
        let chain = self.chain.lock();
        match chain.last() {
            Some(tip) => tip.to_stratum_json(chain.len() as u64 - 1),
            None => serde_json::Value::Null,
        }
    }

    fn take_failure(&self) -> Result<(), ChainError> {
        let failed = self
            .fail_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ChainError::Client(ClientError::ConnectionClosed(
                "mock failure".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HeaderSource for MockHeaderSource {
    fn headers_stream(&self) -> SubscriptionStream {
        self.stream.clone()
    }

    async fn subscribe_headers(&self) -> ResponseFuture {
        ResponseFuture::ready(Ok(StratumMessage::Result {
            id: 0,
            result: self.tip_json(),
        }))
    }

    async fn get_header(&self, height: u64) -> Result<Option<BlockHeader>, ChainError> {
        self.header_requests.lock().push(height);
        self.take_failure()?;
        Ok(self.chain.lock().get(height as usize).copied())
    }

    async fn get_chunk(&self, index: u64) -> Result<Vec<BlockHeader>, ChainError> {
        self.chunk_requests.lock().push(index);
        self.take_failure()?;
        let chain = self.chain.lock();
        let start = (index * self.interval) as usize;
        if start >= chain.len() {
            return Ok(Vec::new());
        }
        let end = (start + self.interval as usize).min(chain.len());
        Ok(chain[start..end].to_vec())
    }
}
