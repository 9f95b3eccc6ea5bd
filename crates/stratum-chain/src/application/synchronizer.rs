//! # Chain Synchronizer
//!
//! One loop per store. Each header notification names the server's tip; the
//! loop fetches whatever the store lacks below it, repairs forks on the way,
//! and finally appends the notified header itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use header_store::HeaderStore;
use serde_json::Value;
use shared_types::{BlockHeader, CodecError};
use stratum_protocol::{spawn_supervised, ClientError, StratumMessage};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::handle::ChainHandle;
use crate::config::ChainConfig;
use crate::domain::ChainError;
use crate::ports::{ChainListener, HeaderSource};

/// Header chain synchronizer.
pub struct StratumChain<S, H> {
    store: S,
    source: Arc<H>,
    config: ChainConfig,
    listeners: Vec<Arc<dyn ChainListener>>,
    /// Last height the server reported.
    peer_height: Arc<AtomicU64>,
}

impl<S, H> StratumChain<S, H>
where
    S: HeaderStore,
    H: HeaderSource,
{
    /// Create a synchronizer over `store`, fed by `source`.
    pub fn new(store: S, source: Arc<H>, config: ChainConfig) -> Self {
        Self {
            store,
            source,
            config,
            listeners: Vec::new(),
            peer_height: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a height listener.
    pub fn add_listener(&mut self, listener: Arc<dyn ChainListener>) {
        self.listeners.push(listener);
    }

    /// Last height the server reported, 0 before the first notification.
    pub fn peer_height(&self) -> u64 {
        self.peer_height.load(Ordering::SeqCst)
    }

    /// True if the store has reached the peer height.
    pub fn is_synced(&self) -> bool {
        self.store.height() >= self.peer_height()
    }

    /// The header store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give up the synchronizer, keeping the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Run until a `Sentinel` arrives or a fatal error occurs, then close
    /// the store.
    pub async fn run(&mut self) -> Result<(), ChainError> {
        let outcome = self.sync().await;
        if let Err(e) = self.store.close() {
            warn!(error = %e, "Failed to close header store");
        }
        info!(height = self.store.height(), "Chain synchronizer closed");
        outcome
    }

    async fn sync(&mut self) -> Result<(), ChainError> {
        self.store.verify_last()?;
        let stream = self.source.headers_stream();
        let mut ack = Some(self.source.subscribe_headers().await);
        info!(height = self.store.height(), "Subscribed to headers");

        loop {
            let (message, from_ack) = match ack.as_mut() {
                Some(pending) => tokio::select! {
                    biased;
                    reply = pending => (reply, true),
                    message = stream.recv() => (Ok(message), false),
                },
                None => (Ok(stream.recv().await), false),
            };
            if from_ack {
                ack = None;
            }

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Header subscription was not acknowledged");
                    continue;
                }
            };
            if message.is_sentinel() {
                info!("Header stream ended");
                return Ok(());
            }

            match self.handle_notification(&message).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Catch-up abandoned, waiting for the next notification");
                }
                Err(e) => {
                    error!(error = %e, "Chain synchronizer failed");
                    return Err(e);
                }
            }
        }
    }

    /// Process one header notification (or the subscribe ack).
    pub async fn handle_notification(&mut self, message: &StratumMessage) -> Result<(), ChainError> {
        let payload = match message {
            StratumMessage::Error { error, .. } => {
                return Err(ClientError::Protocol(error.clone()).into())
            }
            other => other.payload().ok_or(CodecError::MissingField("params"))?,
        };
        let height = payload
            .get("block_height")
            .and_then(Value::as_u64)
            .ok_or(CodecError::MissingField("block_height"))?;
        let header = BlockHeader::from_stratum_json(payload)?;
        self.peer_height.store(height, Ordering::SeqCst);
        info!(height, store_height = self.store.height(), "Server tip");

        // Catch-up may already have passed the notified height using chunk data.
        if self.download(height.saturating_sub(1)).await?
            && height > 0
            && self.store.height() == height - 1
        {
            self.add(header).await?;
        }
        self.notify_height(self.is_synced());
        Ok(())
    }

    /// Fetch headers until the store reaches `height`.
    ///
    /// Returns false if the server had no header at some height below
    /// `height`; the store keeps whatever was appended.
    pub async fn download(&mut self, height: u64) -> Result<bool, ChainError> {
        let interval = self.config.interval;

        while height > self.store.height() + self.config.single_fetch_window {
            let next = self.store.height() + 1;
            let index = next / interval;
            info!(chunk_height = index * interval, "Fetching chunk");
            let chunk = self.source.get_chunk(index).await?;
            info!(size = chunk.len(), "Chunk size");

            let start = (next % interval) as usize;
            if chunk.len() <= start {
                warn!(index, size = chunk.len(), "Chunk holds nothing new");
                break;
            }

            let mut rejected = false;
            for header in chunk.into_iter().skip(start) {
                if !self.add(header).await? {
                    rejected = true;
                    break;
                }
            }
            self.notify_height(false);

            if rejected {
                // Rest of this interval one by one from the repaired tip.
                let chunk_end = ((index + 1) * interval - 1).min(height);
                if !self.fetch_single(chunk_end).await? {
                    return Ok(false);
                }
            }
        }

        self.fetch_single(height).await
    }

    async fn fetch_single(&mut self, height: u64) -> Result<bool, ChainError> {
        while height > self.store.height() {
            let next = self.store.height() + 1;
            debug!(store_height = next - 1, "Fetching header");
            let Some(header) = self.source.get_header(next).await? else {
                warn!(height = next, "No header at height");
                return Ok(false);
            };
            self.add(header).await?;
            self.notify_height(false);
        }
        Ok(true)
    }

    /// Append `header`, repairing a fork if it does not connect.
    ///
    /// Returns false if a repair happened; the store tip is then the
    /// server's header at the fork point plus one.
    async fn add(&mut self, header: BlockHeader) -> Result<bool, ChainError> {
        if self.store.add(header)? {
            return Ok(true);
        }
        self.reorg().await?;
        Ok(false)
    }

    /// Find where the store rejoins the server's chain and rewind to it.
    ///
    /// Steps 1, 2, 4, ... blocks back (bounded by `max_reorg_depth` and the
    /// store base). At the first depth `i` where the server's header at
    /// `H - i + 1` names the store's header at `H - i` as predecessor, the
    /// store is truncated to `H - i` and that server header appended. If no
    /// depth matches the store is left untouched.
    pub async fn reorg(&mut self) -> Result<(), ChainError> {
        let store_height = self.store.height();
        let span = store_height - self.store.base_height();
        let max = self.config.max_reorg_depth;

        let mut step: u64 = 1;
        while step <= max && step <= span {
            let fork_height = store_height - step;
            let store_prev = self.store.get(fork_height)?;
            let store_prev_hash = store_prev.hash();
            info!(
                height = fork_height + 1,
                our_prev = %store_prev_hash,
                "Looking for reorg point"
            );

            let header = self
                .source
                .get_header(fork_height + 1)
                .await?
                .ok_or(ChainError::MissingHeader(fork_height + 1))?;

            if header.prev_hash == store_prev_hash {
                self.store.truncate(fork_height)?;
                if !self.store.add(header)? {
                    return Err(ChainError::ReorgRejected {
                        height: fork_height + 1,
                    });
                }
                warn!(
                    depth = step,
                    height = fork_height + 1,
                    "Reorganized header chain"
                );
                return Ok(());
            }
            step += step;
        }

        Err(ChainError::ReorgDepthExceeded {
            height: store_height,
            max,
        })
    }

    fn notify_height(&self, is_synced: bool) {
        let height = self.store.height();
        let top = self.store.top();
        for listener in &self.listeners {
            listener.on_height(height, &top, is_synced);
        }
    }
}

impl<S, H> StratumChain<S, H>
where
    S: HeaderStore + 'static,
    H: HeaderSource + 'static,
{
    /// Run the loop as a supervised task.
    pub fn start(mut self) -> ChainHandle<S> {
        let peer_height = Arc::clone(&self.peer_height);
        let stream = self.source.headers_stream();
        let (finished_tx, finished_rx) = watch::channel(false);
        let service = spawn_supervised("stratum-chain", async move {
            let outcome: Result<(), ChainError> = self.run().await;
            finished_tx.send_replace(true);
            outcome.map(|()| self.into_store())
        });
        ChainHandle::new(peer_height, stream, finished_rx, service)
    }
}
