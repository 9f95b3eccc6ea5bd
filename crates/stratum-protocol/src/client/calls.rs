//! Calls and subscriptions.

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{write_line, StratumClient};
use crate::domain::methods::{
    ADDRESS_SUBSCRIBE, GET_CHUNK, GET_HEADER, GET_HISTORY, HEADERS_SUBSCRIBE, SERVER_VERSION,
    TRANSACTION_BROADCAST, TRANSACTION_GET,
};
use crate::domain::{
    ClientError, ConnectionState, ResponseFuture, StratumMessage, Subscription, SubscriptionStream,
};
use crate::transport::BoxedWriter;

impl StratumClient {
    /// Send a request and return a future for its reply.
    ///
    /// The future is already failed if the client is not running or the
    /// write fails.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> ResponseFuture {
        let mut connection = self.inner.connection.lock().await;
        let writer = match connection.as_mut() {
            Some(writer) if self.inner.state() == ConnectionState::Running => writer,
            _ => return ResponseFuture::failed(ClientError::NotRunning),
        };

        let id = self.inner.next_id();
        let receiver = self.inner.pending.register(id, method);
        match write_line(writer, &StratumMessage::request_line(id, method, &params)).await {
            Ok(()) => ResponseFuture::waiting(id, receiver),
            Err(e) => {
                self.inner.pending.discard(id);
                warn!(id, method, error = %e, "Failed to send request");
                ResponseFuture::failed(e)
            }
        }
    }

    /// Send a request and wait for its reply.
    ///
    /// A server error reply resolves to `Err(ClientError::Protocol(payload))`.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<StratumMessage, ClientError> {
        self.request(method, params).await.await
    }

    /// Subscribe to `method`, with an optional key parameter.
    ///
    /// The topic queue is registered either way. If the client is not
    /// running the ack fails with `NotRunning`.
    pub async fn subscribe(&self, method: &str, param: Option<String>) -> Subscription {
        let mut connection = self.inner.connection.lock().await;
        self.subscribe_locked(&mut connection, method, param, false)
            .await
    }

    /// Subscribe to status changes of `address`.
    ///
    /// Tracked: re-issued on every later start. Made while disconnected, the
    /// request goes out on the next start and the ack resolves then.
    pub async fn subscribe_to_address(&self, address: &str) -> Subscription {
        let mut connection = self.inner.connection.lock().await;
        let subscription = self
            .subscribe_locked(
                &mut connection,
                ADDRESS_SUBSCRIBE,
                Some(address.to_string()),
                true,
            )
            .await;
        self.inner
            .addresses
            .lock()
            .insert(address.to_string(), subscription.id);
        subscription
    }

    /// Subscribe to new header tips. Tracked like address subscriptions.
    pub async fn subscribe_to_headers(&self) -> Subscription {
        let mut connection = self.inner.connection.lock().await;
        let subscription = self
            .subscribe_locked(&mut connection, HEADERS_SUBSCRIBE, None, true)
            .await;
        *self.inner.headers_subscription.lock() = Some(subscription.id);
        subscription
    }

    async fn subscribe_locked(
        &self,
        connection: &mut Option<BoxedWriter>,
        method: &str,
        param: Option<String>,
        defer: bool,
    ) -> Subscription {
        let stream = self.inner.subscriptions.ensure(method);
        let running = self.inner.state() == ConnectionState::Running;

        let writer = match connection.as_mut() {
            Some(writer) if running => writer,
            _ if defer => {
                let id = self.inner.next_id();
                let receiver = self.inner.pending.register(id, method);
                debug!(id, method, "Subscription deferred until connected");
                return Subscription {
                    id,
                    ack: ResponseFuture::waiting(id, receiver),
                    stream,
                };
            }
            _ => {
                return Subscription {
                    id: self.inner.next_id(),
                    ack: ResponseFuture::failed(ClientError::NotRunning),
                    stream,
                }
            }
        };

        let id = self.inner.next_id();
        let receiver = self.inner.pending.register(id, method);
        let params: Vec<Value> = param.into_iter().map(Value::String).collect();
        let ack = match write_line(writer, &StratumMessage::request_line(id, method, &params)).await {
            Ok(()) => ResponseFuture::waiting(id, receiver),
            Err(e) => {
                self.inner.pending.discard(id);
                warn!(id, method, error = %e, "Failed to send subscription");
                ResponseFuture::failed(e)
            }
        };
        Subscription { id, ack, stream }
    }

    /// Queue of header tip notifications.
    pub fn headers_stream(&self) -> SubscriptionStream {
        self.inner.subscriptions.ensure(HEADERS_SUBSCRIBE)
    }

    /// Queue of address status notifications, all addresses combined.
    pub fn address_stream(&self) -> SubscriptionStream {
        self.inner.subscriptions.ensure(ADDRESS_SUBSCRIBE)
    }

    /// Addresses re-subscribed on every start.
    pub fn subscribed_addresses(&self) -> Vec<String> {
        self.inner.addresses.lock().keys().cloned().collect()
    }

    /// `server.version`.
    pub async fn server_version(&self) -> Result<Value, ClientError> {
        let name = json!(self.inner.config.client_name);
        self.call(SERVER_VERSION, vec![name]).await?.into_result()
    }

    /// Header at `height` in the server's JSON header form; `null` if the
    /// server has no header there.
    pub async fn get_header(&self, height: u64) -> Result<Value, ClientError> {
        self.call(GET_HEADER, vec![json!(height)]).await?.into_result()
    }

    /// Hex-encoded headers of chunk `index`.
    pub async fn get_chunk(&self, index: u64) -> Result<Value, ClientError> {
        self.call(GET_CHUNK, vec![json!(index)]).await?.into_result()
    }

    /// Transaction history of `address`.
    pub async fn get_history(&self, address: &str) -> Result<Value, ClientError> {
        self.call(GET_HISTORY, vec![json!(address)]).await?.into_result()
    }

    /// Raw transaction `txid` as hex.
    pub async fn get_transaction(&self, txid: &str) -> Result<Value, ClientError> {
        self.call(TRANSACTION_GET, vec![json!(txid)]).await?.into_result()
    }

    /// Broadcast a raw hex transaction; returns the server's answer
    /// (normally the txid).
    pub async fn broadcast_transaction(&self, raw_tx: &str) -> Result<Value, ClientError> {
        self.call(TRANSACTION_BROADCAST, vec![json!(raw_tx)])
            .await?
            .into_result()
    }
}
