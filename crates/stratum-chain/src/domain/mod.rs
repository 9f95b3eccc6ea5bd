//! Domain types for the chain synchronizer.

pub mod errors;

pub use errors::ChainError;
