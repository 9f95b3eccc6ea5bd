//! # Stratum Messages
//!
//! One JSON object per `\n`-terminated line. Inbound lines are classified by
//! the fields they carry:
//!
//! | Fields                 | Message        |
//! |------------------------|----------------|
//! | `id` + non-null `error`| `Error`        |
//! | `id`, no `method`      | `Result`       |
//! | `method`, no `id`      | `Notification` |
//! | anything else          | unrecognized   |

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use super::errors::ClientError;

/// A message on a Stratum connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StratumMessage {
    /// Outbound call.
    Request {
        /// Correlation id.
        id: u64,
        /// Method name.
        method: String,
        /// Positional parameters.
        params: Vec<Value>,
    },
    /// Successful reply. A `null` or absent result is `Value::Null`.
    Result {
        /// Id of the answered request.
        id: u64,
        /// Result payload.
        result: Value,
    },
    /// Unsolicited server push for a subscribed topic.
    Notification {
        /// Topic, the subscribe method name.
        method: String,
        /// Positional parameters.
        params: Vec<Value>,
    },
    /// Error reply.
    Error {
        /// Id of the answered request.
        id: u64,
        /// Error payload as sent by the server.
        error: Value,
    },
    /// End-of-stream marker placed in subscription queues on shutdown.
    Sentinel,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl StratumMessage {
    /// Encode an outbound request as one line, newline included.
    pub fn request_line(id: u64, method: &str, params: &[Value]) -> String {
        let mut line = serde_json::to_string(&WireRequest { id, method, params })
            .unwrap_or_else(|_| format!(r#"{{"id":{},"method":"{}","params":[]}}"#, id, method));
        line.push('\n');
        line
    }

    /// Decode one inbound line.
    ///
    /// `Err` for text that is not a JSON object, `Ok(None)` for an object
    /// whose shape matches no message kind.
    pub fn decode(line: &str) -> Result<Option<StratumMessage>, serde_json::Error> {
        let wire: WireMessage = serde_json::from_str(line)?;
        let id = wire.id.as_ref().and_then(Value::as_u64);

        let message = match (id, wire.method, wire.error) {
            (Some(id), _, Some(error)) if !error.is_null() => Some(StratumMessage::Error { id, error }),
            (Some(id), None, _) => Some(StratumMessage::Result {
                id,
                result: wire.result.unwrap_or(Value::Null),
            }),
            (None, Some(method), _) if wire.id.as_ref().map_or(true, Value::is_null) => {
                Some(StratumMessage::Notification {
                    method,
                    params: params_to_vec(wire.params),
                })
            }
            _ => None,
        };
        Ok(message)
    }

    /// Correlation id, if the message carries one.
    pub fn id(&self) -> Option<u64> {
        match self {
            StratumMessage::Request { id, .. }
            | StratumMessage::Result { id, .. }
            | StratumMessage::Error { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Method name of a request or notification.
    pub fn method(&self) -> Option<&str> {
        match self {
            StratumMessage::Request { method, .. } | StratumMessage::Notification { method, .. } => {
                Some(method)
            }
            _ => None,
        }
    }

    /// True for the end-of-stream marker.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, StratumMessage::Sentinel)
    }

    /// The value a subscriber cares about: a non-null `result`, or else the
    /// last positional parameter.
    ///
    /// Subscription acks carry the current status in `result`; notifications
    /// carry it as the last parameter after the subscription key (if any).
    pub fn payload(&self) -> Option<&Value> {
        match self {
            StratumMessage::Result { result, .. } if !result.is_null() => Some(result),
            StratumMessage::Request { params, .. } | StratumMessage::Notification { params, .. } => {
                params.last()
            }
            _ => None,
        }
    }

    /// Consume a reply into its result, mapping error replies to
    /// `ClientError::Protocol`.
    pub fn into_result(self) -> Result<Value, ClientError> {
        match self {
            StratumMessage::Result { result, .. } => Ok(result),
            StratumMessage::Error { error, .. } => Err(ClientError::Protocol(error)),
            other => Err(ClientError::Codec(format!("not a reply: {:?}", other))),
        }
    }
}

fn params_to_vec(params: Option<Value>) -> Vec<Value> {
    match params {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}

/// Pending reply to a call.
///
/// Resolves exactly once: with the server's reply, or with an error when the
/// write failed, the client was not running, or the connection ended first.
#[must_use = "futures do nothing unless polled"]
pub struct ResponseFuture {
    id: Option<u64>,
    state: ResponseState,
}

enum ResponseState {
    Waiting(oneshot::Receiver<Result<StratumMessage, ClientError>>),
    Ready(Option<Result<StratumMessage, ClientError>>),
}

impl ResponseFuture {
    pub(crate) fn waiting(
        id: u64,
        receiver: oneshot::Receiver<Result<StratumMessage, ClientError>>,
    ) -> Self {
        Self {
            id: Some(id),
            state: ResponseState::Waiting(receiver),
        }
    }

    /// An already-resolved future.
    pub fn ready(result: Result<StratumMessage, ClientError>) -> Self {
        Self {
            id: result.as_ref().ok().and_then(StratumMessage::id),
            state: ResponseState::Ready(Some(result)),
        }
    }

    /// An already-failed future.
    pub fn failed(error: ClientError) -> Self {
        Self::ready(Err(error))
    }

    /// Id of the request, if it was sent.
    pub fn id(&self) -> Option<u64> {
        self.id
    }
}

impl Future for ResponseFuture {
    type Output = Result<StratumMessage, ClientError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            ResponseState::Waiting(receiver) => Pin::new(receiver).poll(cx).map(|outcome| {
                outcome.unwrap_or_else(|_| {
                    Err(ClientError::ConnectionClosed("call abandoned".to_string()))
                })
            }),
            ResponseState::Ready(slot) => Poll::Ready(slot.take().unwrap_or_else(|| {
                Err(ClientError::ConnectionClosed("reply already taken".to_string()))
            })),
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("id", &self.id)
            .field(
                "ready",
                &matches!(self.state, ResponseState::Ready(Some(_))),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_request_line() {
        let line = StratumMessage::request_line(1000, "server.version", &[json!("StratumClient 0.1")]);
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value, json!({"id": 1000, "method": "server.version", "params": ["StratumClient 0.1"]}));
    }

    #[test]
    fn test_decode_result() {
        let msg = StratumMessage::decode(r#"{"id": 7, "result": {"block_height": 5}}"#).unwrap();
        assert_eq!(
            msg,
            Some(StratumMessage::Result { id: 7, result: json!({"block_height": 5}) })
        );
    }

    #[test]
    fn test_decode_null_result() {
        let msg = StratumMessage::decode(r#"{"id": 7, "result": null, "error": null}"#).unwrap();
        assert_eq!(msg, Some(StratumMessage::Result { id: 7, result: Value::Null }));
    }

    #[test]
    fn test_decode_error() {
        let msg = StratumMessage::decode(r#"{"id": 8, "error": {"code": 1, "message": "bad"}}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(msg, StratumMessage::Error { id: 8, .. }));
        assert!(matches!(msg.into_result(), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn test_decode_notification() {
        let msg = StratumMessage::decode(
            r#"{"method": "blockchain.headers.subscribe", "params": [{"block_height": 10}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(msg.method(), Some("blockchain.headers.subscribe"));
        assert_eq!(msg.payload(), Some(&json!({"block_height": 10})));
    }

    #[test]
    fn test_decode_notification_with_null_id() {
        let msg = StratumMessage::decode(r#"{"id": null, "method": "m", "params": []}"#).unwrap();
        assert!(matches!(msg, Some(StratumMessage::Notification { .. })));
    }

    #[test]
    fn test_decode_unrecognized_shapes() {
        assert_eq!(StratumMessage::decode(r#"{"foo": 1}"#).unwrap(), None);
        assert_eq!(StratumMessage::decode(r#"{"id": 1, "method": "m"}"#).unwrap(), None);
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(StratumMessage::decode("not json").is_err());
        assert!(StratumMessage::decode("[1, 2]").is_err());
    }

    #[test]
    fn test_address_notification_payload_is_status() {
        let msg = StratumMessage::Notification {
            method: "blockchain.address.subscribe".into(),
            params: vec![json!("1addr"), json!("status-hash")],
        };
        assert_eq!(msg.payload(), Some(&json!("status-hash")));
    }

    proptest! {
        #[test]
        fn prop_request_line_is_one_frame(
            id in any::<u64>(),
            method in "[a-z]{1,12}(\\.[a-z_]{1,12}){0,3}",
            texts in proptest::collection::vec(any::<String>(), 0..4),
            numbers in proptest::collection::vec(any::<i64>(), 0..4),
        ) {
            let params: Vec<Value> = texts
                .into_iter()
                .map(Value::String)
                .chain(numbers.into_iter().map(Value::from))
                .collect();
            let line = StratumMessage::request_line(id, &method, &params);

            prop_assert!(line.ends_with('\n'));
            prop_assert_eq!(line.matches('\n').count(), 1);
            let value: Value = serde_json::from_str(line.trim_end()).unwrap();
            prop_assert_eq!(&value["id"], &json!(id));
            prop_assert_eq!(&value["method"], &json!(method));
            prop_assert_eq!(&value["params"], &Value::Array(params));
        }

        #[test]
        fn prop_reply_decodes_with_its_id(
            id in any::<u64>(),
            height in any::<u32>(),
            failed in any::<bool>(),
        ) {
            let line = if failed {
                json!({"id": id, "result": null, "error": {"code": height}}).to_string()
            } else {
                json!({"id": id, "result": {"block_height": height}}).to_string()
            };
            let message = StratumMessage::decode(&line).unwrap().unwrap();

            prop_assert_eq!(message.id(), Some(id));
            let delivered = tokio_test::block_on(ResponseFuture::ready(Ok(message))).unwrap();
            match delivered.into_result() {
                Ok(result) => {
                    prop_assert!(!failed);
                    prop_assert_eq!(result["block_height"].as_u64(), Some(u64::from(height)));
                }
                Err(ClientError::Protocol(error)) => {
                    prop_assert!(failed);
                    prop_assert_eq!(error["code"].as_u64(), Some(u64::from(height)));
                }
                Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_future_resolves_immediately() {
        let outcome = ResponseFuture::failed(ClientError::NotRunning).await;
        assert!(matches!(outcome, Err(ClientError::NotRunning)));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_connection_closed() {
        let (tx, rx) = oneshot::channel();
        let future = ResponseFuture::waiting(3, rx);
        assert_eq!(future.id(), Some(3));
        drop(tx);
        assert!(matches!(future.await, Err(ClientError::ConnectionClosed(_))));
    }
}
