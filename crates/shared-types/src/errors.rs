//! # Error Types
//!
//! Errors raised while decoding headers and hashes received from a server.

use thiserror::Error;

/// Header/hash decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Input had the wrong byte length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        got: usize,
    },

    /// Chunk data did not split into whole header records.
    #[error("chunk of {len} bytes is not a multiple of {record}")]
    PartialRecord {
        /// Chunk length in bytes.
        len: usize,
        /// Record size in bytes.
        record: usize,
    },

    /// A required JSON field was absent or had the wrong type.
    #[error("missing or malformed field: {0}")]
    MissingField(&'static str),

    /// A JSON number did not fit the header field.
    #[error("field out of range: {0}")]
    OutOfRange(&'static str),
}
