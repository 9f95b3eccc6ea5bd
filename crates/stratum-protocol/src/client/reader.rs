//! Read loop: the only consumer of the socket's read half.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::ClientInner;
use crate::domain::pending::PendingCall;
use crate::domain::{ClientError, ConnectionState, StratumMessage, SubscriptionStream};
use crate::transport::BoxedReader;

/// How long a closing write half may take to flush.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

impl ClientInner {
    /// Read lines until the stream ends, a line is not JSON, or a stop is
    /// requested; then shut the connection down.
    pub(super) async fn run(
        self: Arc<Self>,
        reader: BoxedReader,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), ClientError> {
        let mut lines = BufReader::new(reader).lines();

        let outcome = loop {
            let line = tokio::select! {
                _ = stop.changed() => break Ok(()),
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    break Err(ClientError::ConnectionClosed(
                        "server closed the connection".into(),
                    ))
                }
                Err(e) => break Err(ClientError::Io(e.to_string())),
            };
            if line.trim().is_empty() {
                continue;
            }
            trace!(line = %line, "<");

            match StratumMessage::decode(&line) {
                Ok(Some(message)) => {
                    if !self.dispatch(message, &mut stop).await {
                        break Ok(());
                    }
                }
                Ok(None) => warn!(line = %line, "Unknown message type"),
                Err(e) => break Err(ClientError::Codec(e.to_string())),
            }
        };

        let outcome = match outcome {
            Err(_) if self.state() == ConnectionState::Stopping => Ok(()),
            Err(e) => {
                error!(error = %e, "Stratum connection failed");
                self.set_state(ConnectionState::Failed);
                Err(e)
            }
            Ok(()) => Ok(()),
        };

        drop(lines);
        self.shut_down().await;
        outcome
    }

    /// Route one inbound message. Returns false if a stop arrived while
    /// waiting on a full queue.
    async fn dispatch(&self, message: StratumMessage, stop: &mut watch::Receiver<bool>) -> bool {
        match message {
            StratumMessage::Result { id, .. } => self.complete(id, Ok(message), stop).await,
            StratumMessage::Error { id, error } => {
                self.complete(id, Err(ClientError::Protocol(error)), stop)
                    .await
            }
            StratumMessage::Notification { method, params } => {
                match self.subscriptions.get(&method) {
                    Some(queue) => {
                        let message = StratumMessage::Notification { method, params };
                        self.deliver(&queue, message, stop).await
                    }
                    None => {
                        warn!(method = %method, "Notification for a topic nobody subscribed to");
                        true
                    }
                }
            }
            other => {
                warn!(message = ?other, "Unexpected message from server");
                true
            }
        }
    }

    async fn complete(
        &self,
        id: u64,
        outcome: Result<StratumMessage, ClientError>,
        stop: &mut watch::Receiver<bool>,
    ) -> bool {
        match self.pending.take(id) {
            None => true,
            Some(PendingCall::Caller { sender, method, .. }) => {
                if sender.send(outcome).is_err() {
                    debug!(id, method = %method, "Caller went away before the reply");
                }
                true
            }
            Some(PendingCall::Resubscribe { method, param, .. }) => match outcome {
                Ok(StratumMessage::Result { result, .. }) => {
                    // Present the ack to the topic consumer as a notification.
                    let params = param
                        .map(Value::String)
                        .into_iter()
                        .chain(std::iter::once(result))
                        .collect();
                    let queue = self.subscriptions.ensure(&method);
                    self.deliver(&queue, StratumMessage::Notification { method, params }, stop)
                        .await
                }
                Ok(_) => true,
                Err(e) => {
                    warn!(id, method = %method, error = %e, "Resubscription rejected");
                    true
                }
            },
        }
    }

    async fn deliver(
        &self,
        queue: &SubscriptionStream,
        message: StratumMessage,
        stop: &mut watch::Receiver<bool>,
    ) -> bool {
        tokio::select! {
            _ = queue.push(message) => true,
            _ = stop.changed() => false,
        }
    }

    /// Close the socket, fail all pending calls and end every topic queue.
    pub(super) async fn shut_down(&self) {
        self.state.send_if_modified(|state| {
            if state.can_stop() {
                *state = ConnectionState::Stopping;
                true
            } else {
                false
            }
        });

        let failed = {
            let mut connection = self.connection.lock().await;
            if let Some(mut writer) = connection.take() {
                match tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "Error closing socket"),
                    Err(_) => debug!("Timed out closing socket"),
                }
            }
            self.pending
                .fail_all(&ClientError::ConnectionClosed("shutting down".into()))
        };

        for queue in self.subscriptions.all() {
            if !queue.try_push(StratumMessage::Sentinel) {
                debug!(topic = queue.topic(), "Queue full, sentinel will follow");
                tokio::spawn(async move { queue.push(StratumMessage::Sentinel).await });
            }
        }

        *self.stop_signal.lock() = None;
        self.set_state(ConnectionState::Terminated);
        info!(failed_calls = failed, "Stratum client terminated");
    }
}
