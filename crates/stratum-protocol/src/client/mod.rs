//! # Stratum Client
//!
//! A persistent connection to one Stratum server.
//!
//! ## Concurrency
//!
//! - The **connection lock** (`ClientInner::connection`) guards the write
//!   half. Id assignment, pending-call registration and the request write all
//!   happen under it, so ids hit the wire in increasing order and a reply can
//!   never arrive before its call is registered.
//! - The **read loop** is the only reader. It resolves calls through the
//!   pending table and feeds topic queues, blocking on a full queue.
//! - **Shutdown** fails every pending call under the connection lock, then
//!   queues a `Sentinel` behind whatever each topic queue already holds.
//!
//! ## Lifecycle
//!
//! `start` connects, sends `server.version` as a liveness check, re-issues
//! tracked subscriptions and spawns the read loop. `stop` signals the loop;
//! the loop closes the socket on its way out.

mod calls;
mod reader;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::domain::methods::{ADDRESS_SUBSCRIBE, HEADERS_SUBSCRIBE, SERVER_VERSION};
use crate::domain::{
    ClientError, ConnectionState, PendingCalls, PendingStats, ResponseFuture, StratumMessage,
    SubscriptionRegistry,
};
use crate::service::{spawn_supervised, ServiceHandle};
use crate::transport::{self, BoxedWriter};

/// Handle to the read loop task.
pub type ReadLoopHandle = ServiceHandle<(), ClientError>;

pub(crate) struct ClientInner {
    config: ClientConfig,
    next_id: AtomicU64,
    pending: PendingCalls,
    subscriptions: SubscriptionRegistry,
    /// Connection lock. `Some` while a socket is open.
    connection: Mutex<Option<BoxedWriter>>,
    state: watch::Sender<ConnectionState>,
    stop_signal: parking_lot::Mutex<Option<watch::Sender<bool>>>,
    /// Subscribed addresses and the id of their latest subscribe call.
    addresses: parking_lot::Mutex<BTreeMap<String, u64>>,
    /// Id of the latest headers subscribe call, once subscribed.
    headers_subscription: parking_lot::Mutex<Option<u64>>,
}

/// Stratum protocol client. Clones share one connection.
#[derive(Clone)]
pub struct StratumClient {
    inner: Arc<ClientInner>,
}

impl StratumClient {
    /// Create an idle client.
    pub fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(ClientInner {
                next_id: AtomicU64::new(config.first_request_id),
                pending: PendingCalls::new(),
                subscriptions: SubscriptionRegistry::new(config.queue_capacity()),
                connection: Mutex::new(None),
                state,
                stop_signal: parking_lot::Mutex::new(None),
                addresses: parking_lot::Mutex::new(BTreeMap::new()),
                headers_subscription: parking_lot::Mutex::new(None),
                config,
            }),
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// True while calls are accepted.
    pub fn is_running(&self) -> bool {
        self.state() == ConnectionState::Running
    }

    /// Watch lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the client reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|current| *current == target).await;
    }

    /// Number of calls awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Call statistics.
    pub fn stats(&self) -> &PendingStats {
        self.inner.pending.stats()
    }

    /// Connect and spawn the read loop.
    ///
    /// Allowed from `Idle` or `Terminated`. On connect failure the client
    /// ends up `Terminated` and the error is returned.
    pub async fn start(&self) -> Result<ReadLoopHandle, ClientError> {
        self.inner.transition(
            |state| state.can_start(),
            ConnectionState::Starting,
        )?;

        let (reader, writer) = match transport::connect(&self.inner.config).await {
            Ok(halves) => halves,
            Err(e) => {
                error!(server = %self.inner.config.server, error = %e, "Failed to connect");
                self.inner.shut_down().await;
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.inner.stop_signal.lock() = Some(stop_tx);

        {
            let mut connection = self.inner.connection.lock().await;
            *connection = Some(writer);
            if let Err(e) = self
                .inner
                .transition(|state| *state == ConnectionState::Starting, ConnectionState::Running)
            {
                drop(connection);
                warn!(error = %e, "Stopped while connecting");
                self.inner.shut_down().await;
                return Err(ClientError::ConnectionClosed("stopped while connecting".into()));
            }
            info!(server = %self.inner.config.server, "Stratum client running");
            self.inner.announce(&mut connection).await;
        }

        let inner = Arc::clone(&self.inner);
        Ok(spawn_supervised("stratum-read-loop", inner.run(reader, stop_rx)))
    }

    /// Ask the read loop to exit. Returns immediately.
    pub fn stop(&self) {
        let mut previous = ConnectionState::Idle;
        let changed = self.inner.state.send_if_modified(|state| {
            previous = *state;
            if state.can_stop() {
                *state = ConnectionState::Stopping;
                true
            } else {
                false
            }
        });
        if let Some(signal) = self.inner.stop_signal.lock().as_ref() {
            let _ = signal.send(true);
        }
        if changed {
            info!(from = %previous, "Stopping Stratum client");
        }
    }

    /// Stop and wait until every pending call has been failed.
    pub async fn shutdown(&self) {
        self.stop();
        let mut state = self.inner.state.subscribe();
        let _ = state
            .wait_for(|current| matches!(current, ConnectionState::Idle | ConnectionState::Terminated))
            .await;
    }
}

impl ClientInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
        }
    }

    /// Move to `next` if `allowed` holds for the current state.
    fn transition(
        &self,
        allowed: impl FnOnce(&ConnectionState) -> bool,
        next: ConnectionState,
    ) -> Result<(), ClientError> {
        let mut current = ConnectionState::Idle;
        let changed = self.state.send_if_modified(|state| {
            current = *state;
            if allowed(state) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(from = %current, to = %next, "Connection state changed");
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                from: current,
                to: next,
            })
        }
    }

    /// Liveness check and subscription replay on a fresh connection.
    ///
    /// Runs under the connection lock, before the read loop starts.
    async fn announce(&self, connection: &mut Option<BoxedWriter>) {
        let Some(writer) = connection.as_mut() else {
            return;
        };

        let id = self.next_id();
        let receiver = self.pending.register(id, SERVER_VERSION);
        let line =
            StratumMessage::request_line(id, SERVER_VERSION, &[json!(self.config.client_name)]);
        match write_line(writer, &line).await {
            Ok(()) => {
                tokio::spawn(log_server_version(ResponseFuture::waiting(id, receiver)));
            }
            Err(e) => {
                self.pending.discard(id);
                warn!(error = %e, "Failed to send server.version");
                return;
            }
        }

        let addresses: Vec<(String, u64)> = self
            .addresses
            .lock()
            .iter()
            .map(|(address, id)| (address.clone(), *id))
            .collect();
        for (address, prior) in addresses {
            if let Some(id) = self
                .reissue(writer, ADDRESS_SUBSCRIBE, Some(address.clone()), prior)
                .await
            {
                self.addresses.lock().insert(address, id);
            }
        }

        let headers = *self.headers_subscription.lock();
        if let Some(prior) = headers {
            if let Some(id) = self.reissue(writer, HEADERS_SUBSCRIBE, None, prior).await {
                *self.headers_subscription.lock() = Some(id);
            }
        }
    }

    /// Send a tracked subscription on the current connection.
    ///
    /// A subscribe made while disconnected still has a caller waiting on its
    /// original id, so that id is reused. Otherwise the ack is routed into
    /// the topic queue.
    async fn reissue(
        &self,
        writer: &mut BoxedWriter,
        method: &str,
        param: Option<String>,
        prior: u64,
    ) -> Option<u64> {
        let id = if self.pending.is_pending(prior) {
            prior
        } else {
            let id = self.next_id();
            self.pending
                .register_resubscription(id, method, param.clone());
            id
        };
        let params: Vec<Value> = param.into_iter().map(Value::String).collect();
        match write_line(writer, &StratumMessage::request_line(id, method, &params)).await {
            Ok(()) => {
                debug!(id, method, "Re-issued subscription");
                Some(id)
            }
            Err(e) => {
                self.pending.discard(id);
                warn!(id, method, error = %e, "Failed to re-issue subscription");
                None
            }
        }
    }
}

async fn write_line(writer: &mut BoxedWriter, line: &str) -> Result<(), ClientError> {
    trace!(line = line.trim_end(), ">");
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn log_server_version(reply: ResponseFuture) {
    match reply.await.and_then(StratumMessage::into_result) {
        Ok(version) => info!(version = %version, "Server version"),
        Err(e) => error!(error = %e, "Could not get server version"),
    }
}
