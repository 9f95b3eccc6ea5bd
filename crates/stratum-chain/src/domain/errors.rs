//! # Chain Synchronizer Errors

use header_store::StoreError;
use shared_types::CodecError;
use stratum_protocol::ClientError;
use thiserror::Error;

/// Synchronizer errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A call to the server failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// The header store failed.
    #[error("header store error: {0}")]
    Store(#[from] StoreError),

    /// The server sent malformed header data.
    #[error("malformed header data: {0}")]
    Decode(#[from] CodecError),

    /// The server has no header at a height it should have.
    #[error("server has no header at height {0}")]
    MissingHeader(u64),

    /// No fork point within the configured depth.
    #[error("could not find a reorg point within {max} blocks of height {height}")]
    ReorgDepthExceeded {
        /// Store height when repair started.
        height: u64,
        /// Configured maximum depth.
        max: u64,
    },

    /// The fork point was found but the server's header did not connect.
    #[error("could not add header at height {height} during reorg")]
    ReorgRejected {
        /// Height of the rejected header.
        height: u64,
    },
}

impl ChainError {
    /// Transient errors abandon one catch-up attempt; the loop retries on
    /// the next notification. Everything else ends the synchronizer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Client(_) | ChainError::Decode(_) | ChainError::MissingHeader(_)
        )
    }
}
