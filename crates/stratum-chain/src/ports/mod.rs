//! # Ports Module
//!
//! - `outbound` - where headers come from (`HeaderSource`)
//! - `listener` - who hears about height changes (`ChainListener`)
//!
//! The header store port lives in the `header-store` crate.

pub mod listener;
pub mod outbound;

pub use listener::ChainListener;
pub use outbound::{HeaderSource, MockHeaderSource};
