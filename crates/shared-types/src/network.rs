//! # Networks
//!
//! Chain parameters the header synchronizer needs: the genesis header and
//! the retarget interval that chunk fetches are aligned to.

use serde::{Deserialize, Serialize};

use crate::entities::{BlockHash, BlockHeader};

/// Blocks per difficulty retarget interval (one Stratum chunk).
pub const RETARGET_INTERVAL: u64 = 2016;

/// Merkle root of the genesis coinbase, shared by mainnet and testnet.
const GENESIS_MERKLE_ROOT: [u8; 32] = [
    0x3b, 0xa3, 0xed, 0xfd, 0x7a, 0x7b, 0x12, 0xb2, 0x7a, 0xc7, 0x2c, 0x3e, 0x67, 0x76, 0x8f, 0x61,
    0x7f, 0xc8, 0x1b, 0xc3, 0x88, 0x8a, 0x51, 0x32, 0x3a, 0x9f, 0xb8, 0xaa, 0x4b, 0x1e, 0x5e, 0x4a,
];

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Bitcoin mainnet.
    #[default]
    Mainnet,
    /// Bitcoin testnet3.
    Testnet,
}

impl Network {
    /// Genesis header of this network.
    pub fn genesis(&self) -> BlockHeader {
        let (time, nonce) = match self {
            Network::Mainnet => (1_231_006_505, 2_083_236_893),
            Network::Testnet => (1_296_688_602, 414_098_458),
        };
        BlockHeader {
            version: 1,
            prev_hash: BlockHash::ZERO,
            merkle_root: BlockHash(GENESIS_MERKLE_ROOT),
            time,
            bits: 0x1d00ffff,
            nonce,
        }
    }

    /// Retarget interval (chunk size served by `blockchain.block.get_chunk`).
    pub fn interval(&self) -> u64 {
        RETARGET_INTERVAL
    }

    /// Default Stratum TLS port.
    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 50002,
            Network::Testnet => 51002,
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" | "testnet3" => Ok(Network::Testnet),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testnet_genesis_hash() {
        assert_eq!(
            Network::Testnet.genesis().hash().to_hex(),
            "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943"
        );
    }

    #[test]
    fn test_genesis_merkle_root_display() {
        assert_eq!(
            Network::Mainnet.genesis().merkle_root.to_hex(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn test_parse_network() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("MAINNET".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("regtest".parse::<Network>().is_err());
    }
}
