//! Height-change listener port.

use shared_types::BlockHeader;

/// Receives the store height after every catch-up step.
///
/// Called synchronously from the synchronizer loop; implementations must
/// return quickly.
pub trait ChainListener: Send + Sync {
    /// `height` and `top` are the store's current tip. `is_synced` is false
    /// during catch-up and true once the store reached the peer height.
    fn on_height(&self, height: u64, top: &BlockHeader, is_synced: bool);
}

impl<F> ChainListener for F
where
    F: Fn(u64, &BlockHeader, bool) + Send + Sync,
{
    fn on_height(&self, height: u64, top: &BlockHeader, is_synced: bool) {
        self(height, top, is_synced)
    }
}
