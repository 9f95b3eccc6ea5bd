//! # Runtime Listeners
//!
//! - [`LoggingListener`] logs store height changes reported by the
//!   synchronizer.
//! - [`AddressWatcher`] subscribes to the configured addresses and logs
//!   every status change the server pushes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use shared_types::BlockHeader;
use stratum_chain::ChainListener;
use stratum_protocol::{
    spawn_supervised, ClientError, ServiceHandle, StratumClient, StratumMessage,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Logs height changes and remembers the latest one.
#[derive(Debug, Default)]
pub struct LoggingListener {
    height: AtomicU64,
    synced: AtomicBool,
}

impl LoggingListener {
    /// Create a listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reported store height.
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    /// Whether the last report was in sync with the server.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

impl ChainListener for LoggingListener {
    fn on_height(&self, height: u64, top: &BlockHeader, is_synced: bool) {
        self.height.store(height, Ordering::SeqCst);
        let was_synced = self.synced.swap(is_synced, Ordering::SeqCst);
        if is_synced {
            info!(height, hash = %top.hash(), "Header chain synced");
        } else {
            if was_synced {
                info!(height, "Catching up with server");
            }
            debug!(height, "Header chain height");
        }
    }
}

/// Subscribes to addresses and logs their status notifications.
pub struct AddressWatcher {
    client: StratumClient,
    addresses: Vec<String>,
    updates: Arc<AtomicU64>,
}

impl AddressWatcher {
    /// Watch `addresses` through `client`.
    pub fn new(client: StratumClient, addresses: Vec<String>) -> Self {
        Self {
            client,
            addresses,
            updates: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Status notifications seen so far, shared with the running task.
    pub fn updates(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.updates)
    }

    /// Subscribe to every address and log notifications until the address
    /// queue ends or `shutdown` fires.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> ServiceHandle<(), ClientError> {
        spawn_supervised("address-watcher", async move {
            let stream = self.client.address_stream();
            for address in &self.addresses {
                let subscription = self.client.subscribe_to_address(address).await;
                let address = address.clone();
                // The ack may sit behind queued notifications; never block
                // the loop on it.
                tokio::spawn(async move {
                    match subscription.ack.await.and_then(StratumMessage::into_result) {
                        Ok(status) => info!(%address, status = %status, "Address subscribed"),
                        Err(e) => warn!(%address, error = %e, "Address subscription failed"),
                    }
                });
            }

            loop {
                let message = tokio::select! {
                    message = stream.recv() => message,
                    _ = shutdown.changed() => {
                        info!("Address watcher shutting down");
                        break;
                    }
                };
                match message {
                    StratumMessage::Sentinel => {
                        info!("Address stream ended");
                        break;
                    }
                    StratumMessage::Notification { params, .. } => {
                        self.updates.fetch_add(1, Ordering::SeqCst);
                        let address = params.first().and_then(Value::as_str).unwrap_or("?");
                        let status = params.get(1).cloned().unwrap_or(Value::Null);
                        info!(address, status = %status, "Address status changed");
                    }
                    other => debug!(message = ?other, "Unexpected address message"),
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Network;

    #[test]
    fn test_logging_listener_tracks_height() {
        let listener = LoggingListener::new();
        let genesis = Network::Mainnet.genesis();
        listener.on_height(5, &genesis, false);
        assert_eq!(listener.height(), 5);
        assert!(!listener.is_synced());
        listener.on_height(9, &genesis, true);
        assert_eq!(listener.height(), 9);
        assert!(listener.is_synced());
    }
}
