//! Cross-crate flows over a real TCP connection.

mod protocol_flows;
mod sync_flows;
