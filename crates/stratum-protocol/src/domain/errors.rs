//! Client error types.

use super::state::ConnectionState;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the Stratum client.
///
/// `Clone` so one shutdown error can fail every pending call.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The client is not in the `Running` state.
    #[error("client is not running")]
    NotRunning,

    /// The connection ended before the call was answered.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Socket read or write failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A line from the server was not valid JSON.
    #[error("invalid message: {0}")]
    Codec(String),

    /// The server answered with an error object.
    #[error("server error: {0}")]
    Protocol(Value),

    /// Lifecycle operation not allowed in the current state.
    #[error("cannot move from {from} to {to}")]
    InvalidState {
        /// Current state.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },
}

impl ClientError {
    /// True for errors caused by the connection going away.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ClientError::NotRunning | ClientError::ConnectionClosed(_) | ClientError::Io(_)
        )
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}
