//! Application layer: the synchronizer loop and its task handle.

pub mod handle;
pub mod synchronizer;

pub use handle::ChainHandle;
pub use synchronizer::StratumChain;
