//! # Header Store
//!
//! Append-only, truncatable, height-indexed store of block headers consumed
//! by the chain synchronizer.
//!
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Contract
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | `verify_last` | Fails if the stored tail does not link by hash |
//! | `height` / `top` | Highest contiguous header held |
//! | `get(h)` | Header at `h`, error if out of range |
//! | `add(h)` | `Ok(true)` if it connected to the tip, `Ok(false)` on predecessor mismatch |
//! | `truncate(h)` | Discard everything above `h` |
//! | `close` | Flush and release resources |
//!
//! ## Module Structure
//!
//! ```text
//! header-store/
//! ├── domain/      # StoreError
//! ├── ports/       # HeaderStore trait
//! └── adapters/    # MemoryHeaderStore, FileHeaderStore
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::MemoryHeaderStore;
#[cfg(feature = "file")]
pub use adapters::FileHeaderStore;
pub use domain::StoreError;
pub use ports::HeaderStore;

/// Default number of tail headers checked by `verify_last`.
pub const DEFAULT_VERIFY_DEPTH: u64 = 2016;
