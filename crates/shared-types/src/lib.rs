//! # Shared Types Crate
//!
//! Block-header types shared by the header store, the Stratum protocol
//! client and the chain synchronizer.
//!
//! ## Contents
//!
//! - `entities` - `BlockHeader` (80-byte wire codec), `BlockHash`, chunk decoding
//! - `network` - genesis headers and retarget interval
//! - `errors` - `CodecError`

pub mod entities;
pub mod errors;
pub mod network;

pub use entities::*;
pub use errors::*;
pub use network::*;
