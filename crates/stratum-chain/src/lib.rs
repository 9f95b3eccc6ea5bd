//! # Stratum Chain Synchronizer
//!
//! Keeps a [`HeaderStore`](header_store::HeaderStore) equal to a prefix of
//! the header chain a Stratum server reports, including after the server's
//! tip moves backward (a reorganization).
//!
//! ## Loop
//!
//! ```text
//! verify store tail ─► subscribe to headers ─► wait for notification ─┐
//!                                                   ▲                 │
//!                                                   └── catch up ◄────┘
//! ```
//!
//! Catch-up fetches whole retarget-interval chunks while far behind, then
//! single headers. A header that does not connect to the store tip triggers
//! fork repair: an exponential backward search (1, 2, 4, ... blocks) for the
//! highest height where the server's chain and the store agree.
//!
//! ## Shutdown
//!
//! The loop reads the header queue owned by the protocol client. A
//! `Sentinel` in that queue (pushed by the client on disconnect, or by
//! [`ChainHandle::close`]) ends the loop and closes the store.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::StratumHeaderSource;
pub use application::{ChainHandle, StratumChain};
pub use config::ChainConfig;
pub use domain::ChainError;
pub use ports::{ChainListener, HeaderSource, MockHeaderSource};
