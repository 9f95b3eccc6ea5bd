//! # Stratum Light Client Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Header chains and a chain-serving mock server
//! └── integration/
//!     ├── protocol_flows.rs   # Client against a scripted server
//!     └── sync_flows.rs       # Synchronizer over a real client connection
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p stratum-tests
//! cargo test -p stratum-tests integration::sync_flows
//! ```

pub mod fixtures;
pub mod integration;
