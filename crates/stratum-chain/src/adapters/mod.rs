//! Adapters for the synchronizer's outbound ports.

pub mod stratum;

pub use stratum::StratumHeaderSource;
