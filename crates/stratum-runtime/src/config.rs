//! # Runtime Configuration
//!
//! Loaded from an optional TOML file named by `STRATUM_CONFIG`, then
//! overridden by environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `STRATUM_SERVER` | `client.server` (host:port) |
//! | `STRATUM_TLS` | `client.security` (`1`/`true` for TLS, `0`/`false` for plain) |
//! | `STRATUM_STORE` | `store_path` (empty for the memory store) |
//! | `STRATUM_NETWORK` | `network` |
//!
//! The TLS variant accepts any server certificate; it exists because public
//! Stratum servers commonly run with self-signed certificates.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared_types::Network;
use stratum_chain::ChainConfig;
use stratum_protocol::{ClientConfig, TransportSecurity};
use tracing::info;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "STRATUM_CONFIG";

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Stratum client configuration.
    pub client: ClientConfig,
    /// Synchronizer configuration.
    pub chain: ChainConfig,
    /// Chain whose headers are synced.
    pub network: Network,
    /// Header file. The store lives in memory when unset.
    pub store_path: Option<PathBuf>,
    /// Addresses to subscribe to and log.
    pub watch_addresses: Vec<String>,
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: String,
    /// Emit JSON log lines.
    pub json_logs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            chain: ChainConfig::default(),
            network: Network::Mainnet,
            store_path: None,
            watch_addresses: Vec::new(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl RuntimeConfig {
    /// Load from `STRATUM_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup` (the environment in production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(server) = lookup("STRATUM_SERVER") {
            self.client.server = server;
        }
        if let Some(tls) = lookup("STRATUM_TLS") {
            self.client.security = parse_security(&tls)?;
        }
        if let Some(path) = lookup("STRATUM_STORE") {
            self.store_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(network) = lookup("STRATUM_NETWORK") {
            self.network = network.parse().map_err(|e: String| anyhow!(e))?;
            self.chain.interval = self.network.interval();
        }
        Ok(())
    }

    /// Check the parts that cannot be checked while parsing.
    pub fn validate(&self) -> Result<()> {
        if self.client.server.is_empty() {
            bail!("client.server must not be empty");
        }
        self.chain
            .validate()
            .map_err(|e| anyhow!("invalid chain config: {}", e))
    }
}

fn parse_security(value: &str) -> Result<TransportSecurity> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "tls" => Ok(TransportSecurity::TlsAcceptAnyCertificate),
        "0" | "false" | "no" | "plain" => Ok(TransportSecurity::Plain),
        other => bail!("STRATUM_TLS: expected true or false, got {:?}", other),
    }
}
