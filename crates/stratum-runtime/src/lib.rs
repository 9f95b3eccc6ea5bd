//! # Stratum Runtime Library
//!
//! Exposes the runtime wiring for tests. The entry point is the `main.rs`
//! binary.
//!
//! ## Modular Structure
//!
//! - `config` - `RuntimeConfig`, TOML file plus environment overrides
//! - `logging` - tracing subscriber setup
//! - `listeners` - `LoggingListener` (heights) and `AddressWatcher`
//! - `runtime` - `StratumRuntime`, startup and shutdown sequencing

#![warn(missing_docs)]

pub mod config;
pub mod listeners;
pub mod logging;
pub mod runtime;

pub use config::RuntimeConfig;
pub use listeners::{AddressWatcher, LoggingListener};
pub use runtime::{RuntimeReport, StratumRuntime};
