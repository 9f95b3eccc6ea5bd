//! # Client Configuration
//!
//! Configuration for the Stratum protocol client.

use serde::{Deserialize, Serialize};

/// Default capacity of each subscription delivery queue.
pub const SUBSCRIPTION_QUEUE_CAPACITY: usize = 10;

/// First request id assigned on a new client.
pub const FIRST_REQUEST_ID: u64 = 1000;

/// Client name sent with `server.version`.
pub const DEFAULT_CLIENT_NAME: &str = "StratumClient 0.1";

/// Transport security for the server connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// Plain TCP.
    #[default]
    Plain,
    /// TLS without certificate validation.
    ///
    /// INSECURE: any certificate the server presents is accepted, so the
    /// connection is encrypted but not authenticated. Headers received over it
    /// are only as trustworthy as the chain linkage checks applied to them.
    TlsAcceptAnyCertificate,
}

impl TransportSecurity {
    /// True for any TLS mode.
    pub fn is_tls(&self) -> bool {
        !matches!(self, TransportSecurity::Plain)
    }
}

/// Stratum client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub server: String,

    /// Transport security.
    pub security: TransportSecurity,

    /// Client identifier sent with `server.version`.
    pub client_name: String,

    /// Capacity of each subscription delivery queue. A full queue blocks the
    /// read loop until its consumer drains it.
    pub subscription_queue_capacity: usize,

    /// First request id.
    pub first_request_id: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:50001".to_string(),
            security: TransportSecurity::Plain,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            subscription_queue_capacity: SUBSCRIPTION_QUEUE_CAPACITY,
            first_request_id: FIRST_REQUEST_ID,
        }
    }
}

impl ClientConfig {
    /// Config for `server` with default settings.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    /// Set transport security.
    pub fn with_security(mut self, security: TransportSecurity) -> Self {
        self.security = security;
        self
    }

    /// Create a config for testing (plain TCP, small queues).
    pub fn for_testing(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            security: TransportSecurity::Plain,
            client_name: "StratumClient test".to_string(),
            subscription_queue_capacity: 4,
            first_request_id: 1,
        }
    }

    /// Host part of `server`, without brackets for IPv6 literals.
    pub fn host(&self) -> &str {
        let host = match self.server.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => self.server.as_str(),
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Queue capacity, at least one.
    pub(crate) fn queue_capacity(&self) -> usize {
        self.subscription_queue_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.subscription_queue_capacity, 10);
        assert_eq!(config.first_request_id, 1000);
        assert_eq!(config.security, TransportSecurity::Plain);
    }

    #[test]
    fn test_host() {
        assert_eq!(ClientConfig::new("electrum.example.org:50002").host(), "electrum.example.org");
        assert_eq!(ClientConfig::new("[::1]:50001").host(), "::1");
        assert_eq!(ClientConfig::new("localhost").host(), "localhost");
    }

    #[test]
    fn test_security_from_toml_style_name() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"server": "h:1", "security": "tls_accept_any_certificate"}"#,
        )
        .unwrap();
        assert!(config.security.is_tls());
        assert_eq!(config.client_name, DEFAULT_CLIENT_NAME);
    }

    #[test]
    fn test_queue_capacity_is_never_zero() {
        let mut config = ClientConfig::default();
        config.subscription_queue_capacity = 0;
        assert_eq!(config.queue_capacity(), 1);
    }
}
