//! # Ports Module
//!
//! The storage interface the chain synchronizer depends on.

use crate::domain::StoreError;
use shared_types::BlockHeader;

/// Height-indexed block header store - outbound port of the synchronizer.
///
/// Single writer: only the synchronizer mutates a store.
pub trait HeaderStore: Send {
    /// Check that the stored tail links by hash.
    fn verify_last(&self) -> Result<(), StoreError>;

    /// Highest contiguous header height held.
    fn height(&self) -> u64;

    /// Header at `height()`.
    fn top(&self) -> BlockHeader;

    /// Header at `height`.
    fn get(&self, height: u64) -> Result<BlockHeader, StoreError>;

    /// Append `header` if it connects to the current tip.
    ///
    /// Returns `Ok(false)` without modifying the store when the header's
    /// predecessor hash does not match the tip.
    fn add(&mut self, header: BlockHeader) -> Result<bool, StoreError>;

    /// Discard every header above `height`.
    fn truncate(&mut self, height: u64) -> Result<(), StoreError>;

    /// Flush and release the store.
    fn close(&mut self) -> Result<(), StoreError>;

    /// Lowest height held (genesis or checkpoint).
    fn base_height(&self) -> u64 {
        0
    }
}

impl<T: HeaderStore + ?Sized> HeaderStore for Box<T> {
    fn verify_last(&self) -> Result<(), StoreError> {
        (**self).verify_last()
    }

    fn height(&self) -> u64 {
        (**self).height()
    }

    fn top(&self) -> BlockHeader {
        (**self).top()
    }

    fn get(&self, height: u64) -> Result<BlockHeader, StoreError> {
        (**self).get(height)
    }

    fn add(&mut self, header: BlockHeader) -> Result<bool, StoreError> {
        (**self).add(header)
    }

    fn truncate(&mut self, height: u64) -> Result<(), StoreError> {
        (**self).truncate(height)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        (**self).close()
    }

    fn base_height(&self) -> u64 {
        (**self).base_height()
    }
}
