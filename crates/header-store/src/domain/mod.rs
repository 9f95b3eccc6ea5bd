//! # Domain Module
//!
//! Error types for header storage.

pub mod errors;

pub use errors::*;
