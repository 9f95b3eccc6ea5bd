//! # Stratum Protocol Client
//!
//! Client for the Stratum protocol spoken by Electrum-style servers:
//! JSON-RPC over a persistent TCP or TLS connection, one JSON object per
//! `\n`-terminated line.
//!
//! ## What it does
//!
//! - Correlates replies to calls by request id, whatever order they arrive in
//! - Routes server-pushed notifications into one bounded queue per topic
//! - Re-issues address and header subscriptions on every (re)start
//! - Fails every outstanding call and ends every queue with a `Sentinel`
//!   when the connection goes away
//!
//! ## Architecture
//!
//! ```text
//! callers ──call/subscribe──► [connection lock] ──write──► socket
//!                                   │ register id
//!                                   ▼
//!                            PendingCalls (id → oneshot)
//!                                   ▲ take(id)
//! socket ──lines──► read loop ──────┤
//!                                   └──notifications──► SubscriptionStream per topic
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use stratum_protocol::{ClientConfig, StratumClient, TransportSecurity};
//!
//! let client = StratumClient::new(
//!     ClientConfig::new("electrum.example.org:50002")
//!         .with_security(TransportSecurity::TlsAcceptAnyCertificate),
//! );
//! let read_loop = client.start().await?;
//! let tip = client.subscribe_to_headers().await.ack.await?;
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod domain;
pub mod service;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{ReadLoopHandle, StratumClient};
pub use config::{ClientConfig, TransportSecurity};
pub use domain::methods;
pub use domain::{
    ClientError, ConnectionState, PendingStats, ResponseFuture, StratumMessage, Subscription,
    SubscriptionStream,
};
pub use service::{spawn_supervised, ServiceError, ServiceHandle};
