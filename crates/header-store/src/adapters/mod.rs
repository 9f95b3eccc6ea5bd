//! # Adapters Layer
//!
//! `HeaderStore` implementations.

#[cfg(feature = "file")]
mod file;
mod memory;

#[cfg(feature = "file")]
pub use file::FileHeaderStore;
pub use memory::MemoryHeaderStore;
