//! # Domain Errors

use shared_types::CodecError;
use std::path::PathBuf;
use thiserror::Error;

/// Header store errors.
///
/// A predecessor mismatch on `add` is NOT an error; it is `Ok(false)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested height is outside the stored range.
    #[error("height {height} out of range [{base}, {top}]")]
    OutOfRange {
        /// Requested height
        height: u64,
        /// Lowest stored height
        base: u64,
        /// Highest stored height
        top: u64,
    },

    /// Truncation would remove the base header.
    #[error("cannot truncate to {height}: below base height {base}")]
    BelowBase {
        /// Requested height
        height: u64,
        /// Lowest stored height
        base: u64,
    },

    /// The stored tail does not link by hash.
    #[error("header chain broken at height {height}")]
    BrokenLink {
        /// First height whose predecessor hash does not match
        height: u64,
    },

    /// Stored data is unreadable or belongs to another chain.
    #[error("corrupted header store: {0}")]
    Corrupted(String),

    /// Another process holds the store.
    #[error("header store already in use ({})", .0.display())]
    Locked(PathBuf),

    /// The store was closed.
    #[error("header store is closed")]
    Closed,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
