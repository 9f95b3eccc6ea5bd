//! # Chain Configuration

use serde::{Deserialize, Serialize};
use shared_types::{Network, RETARGET_INTERVAL};

/// Deepest fork the synchronizer will repair.
pub const MAX_REORG_DEPTH: u64 = 16384;

/// Below this many missing headers, fetch one at a time.
pub const SINGLE_FETCH_WINDOW: u64 = 50;

/// Synchronizer configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Headers per chunk (`blockchain.block.get_chunk` index size).
    pub interval: u64,

    /// Headers fetched one by one once the store is this close to the target.
    pub single_fetch_window: u64,

    /// Deepest fork repaired; a deeper divergence is fatal.
    pub max_reorg_depth: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            interval: RETARGET_INTERVAL,
            single_fetch_window: SINGLE_FETCH_WINDOW,
            max_reorg_depth: MAX_REORG_DEPTH,
        }
    }
}

impl ChainConfig {
    /// Defaults for `network`.
    pub fn for_network(network: Network) -> Self {
        Self {
            interval: network.interval(),
            ..Default::default()
        }
    }

    /// Create a config for testing (small chunks).
    pub fn for_testing() -> Self {
        Self {
            interval: 50,
            single_fetch_window: 5,
            max_reorg_depth: 64,
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval == 0 {
            return Err("interval must be positive".to_string());
        }
        if self.max_reorg_depth == 0 {
            return Err("max_reorg_depth must be positive".to_string());
        }
        Ok(())
    }
}
