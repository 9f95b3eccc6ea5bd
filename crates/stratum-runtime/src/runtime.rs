//! # Stratum Runtime
//!
//! ## Startup Sequence
//!
//! 1. Open the header store (file or memory)
//! 2. Connect the Stratum client
//! 3. Start the chain synchronizer over the client's header queue
//! 4. Start the address watcher (if addresses are configured)
//!
//! ## Shutdown Sequence
//!
//! 1. Signal the watcher
//! 2. Stop the client (fails pending calls, ends every topic queue)
//! 3. Close the synchronizer, which closes the store
//! 4. Report the final heights

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use header_store::{FileHeaderStore, HeaderStore, MemoryHeaderStore};
use stratum_chain::{ChainHandle, StratumChain, StratumHeaderSource};
use stratum_protocol::{ClientError, ReadLoopHandle, ServiceError, ServiceHandle, StratumClient};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::listeners::{AddressWatcher, LoggingListener};

/// Store type driven by the runtime.
pub type DynHeaderStore = Box<dyn HeaderStore>;

/// Final state reported by [`StratumRuntime::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeReport {
    /// Store height at shutdown.
    pub height: u64,
    /// Last height the server reported.
    pub peer_height: u64,
    /// Address status notifications received.
    pub address_updates: u64,
}

struct Running {
    read_loop: ReadLoopHandle,
    chain: ChainHandle<DynHeaderStore>,
    watcher: Option<ServiceHandle<(), ClientError>>,
    address_updates: Arc<AtomicU64>,
}

/// Wires store, client, synchronizer and watchers together.
pub struct StratumRuntime {
    config: RuntimeConfig,
    client: StratumClient,
    listener: Arc<LoggingListener>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
    running: Option<Running>,
}

impl StratumRuntime {
    /// Create an idle runtime.
    pub fn new(config: RuntimeConfig) -> Self {
        let client = StratumClient::new(config.client.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            client,
            listener: Arc::new(LoggingListener::new()),
            shutdown_tx,
            shutdown_rx,
            running: None,
        }
    }

    /// The runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The shared Stratum client.
    pub fn client(&self) -> &StratumClient {
        &self.client
    }

    /// The height listener.
    pub fn listener(&self) -> &LoggingListener {
        &self.listener
    }

    /// Address status notifications received so far.
    pub fn address_updates(&self) -> u64 {
        self.running
            .as_ref()
            .map_or(0, |running| running.address_updates.load(Ordering::SeqCst))
    }

    /// Open the configured header store.
    pub fn open_store(&self) -> Result<DynHeaderStore> {
        let genesis = self.config.network.genesis();
        match &self.config.store_path {
            Some(path) => {
                let store = FileHeaderStore::open(path, genesis)
                    .with_context(|| format!("Failed to open header store {}", path.display()))?;
                Ok(Box::new(store))
            }
            None => {
                info!(network = ?self.config.network, "Using in-memory header store");
                Ok(Box::new(MemoryHeaderStore::new(genesis)))
            }
        }
    }

    /// Start every component.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            bail!("runtime already started");
        }
        info!("===========================================");
        info!("  Stratum Light Client v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        // Step 1: Header store
        let store = self.open_store()?;
        info!(height = store.height(), "Header store ready");

        // Step 2: Stratum connection
        let read_loop = self
            .client
            .start()
            .await
            .with_context(|| format!("Failed to connect to {}", self.config.client.server))?;

        // Step 3: Chain synchronizer
        let source = Arc::new(StratumHeaderSource::new(self.client.clone()));
        let mut chain = StratumChain::new(store, source, self.config.chain.clone());
        chain.add_listener(self.listener.clone());
        let chain = chain.start();

        // Step 4: Address watcher
        let watcher = AddressWatcher::new(self.client.clone(), self.config.watch_addresses.clone());
        let address_updates = watcher.updates();
        let watcher = if self.config.watch_addresses.is_empty() {
            None
        } else {
            Some(watcher.start(self.shutdown_rx.clone()))
        };

        info!(
            server = %self.config.client.server,
            tls = self.config.client.security.is_tls(),
            addresses = self.config.watch_addresses.len(),
            "Stratum runtime started"
        );
        self.running = Some(Running {
            read_loop,
            chain,
            watcher,
            address_updates,
        });
        Ok(())
    }

    /// Resolve once the server connection is gone.
    pub async fn disconnected(&self) {
        let mut state = self.client.watch_state();
        let _ = state.wait_for(|state| state.is_terminal()).await;
    }

    /// Resolve once the synchronizer has exited on its own, typically on a
    /// fatal error. Never resolves on a runtime that is not running.
    pub async fn chain_finished(&self) {
        match &self.running {
            Some(running) => running.chain.finished().await,
            None => std::future::pending().await,
        }
    }

    /// Stop every component and report the final heights.
    ///
    /// Fails if the synchronizer ended with an error.
    pub async fn shutdown(&mut self) -> Result<RuntimeReport> {
        let running = self
            .running
            .take()
            .ok_or_else(|| anyhow!("runtime not started"))?;
        info!("Initiating graceful shutdown...");

        // Signal all handlers to stop
        self.shutdown_tx.send_replace(true);

        self.client.shutdown().await;
        match running.read_loop.join().await {
            Ok(()) => {}
            Err(e) => warn!(error = %e, "Read loop ended with an error"),
        }

        let peer_height = running.chain.peer_height();
        let chain = running.chain.close().await;

        if let Some(watcher) = running.watcher {
            if let Err(e) = watcher.join().await {
                warn!(error = %e, "Address watcher ended with an error");
            }
        }

        let store = match chain {
            Ok(store) => store,
            Err(ServiceError::Failed(e)) => {
                error!(error = %e, "Chain synchronizer failed");
                return Err(e).context("Chain synchronizer failed");
            }
            Err(e) => {
                error!(error = %e, "Chain synchronizer did not finish");
                return Err(anyhow!("chain synchronizer did not finish: {}", e));
            }
        };

        let report = RuntimeReport {
            height: store.height(),
            peer_height,
            address_updates: running.address_updates.load(Ordering::SeqCst),
        };
        info!(
            height = report.height,
            peer_height = report.peer_height,
            address_updates = report.address_updates,
            "Shutdown complete"
        );
        Ok(report)
    }
}
