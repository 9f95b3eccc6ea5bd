//! # Core Domain Entities
//!
//! Block headers as they travel over Stratum and sit in the header store.
//!
//! ## Wire Layout (80 bytes, little-endian)
//!
//! ```text
//! | version (4) | prev_hash (32) | merkle_root (32) | time (4) | bits (4) | nonce (4) |
//! ```
//!
//! Hashes are kept in wire (internal) byte order. Servers and explorers show
//! them byte-reversed; `BlockHash::from_hex` / `Display` handle that form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::CodecError;

/// Size of one serialized block header.
pub const HEADER_SIZE: usize = 80;

/// A 32-byte double-SHA-256 hash in wire byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// The all-zero hash (predecessor of a genesis header).
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    /// Double SHA-256 of `data`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        Self(out)
    }

    /// Parse the byte-reversed hex form used by servers and explorers.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(CodecError::InvalidLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        for (dst, src) in out.iter_mut().zip(bytes.iter().rev()) {
            *dst = *src;
        }
        Ok(Self(out))
    }

    /// Byte-reversed hex form.
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    /// Raw bytes in wire order.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

impl FromStr for BlockHash {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A block header (no transactions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version.
    pub version: i32,
    /// Hash of the previous block header.
    pub prev_hash: BlockHash,
    /// Merkle root of the block's transactions.
    pub merkle_root: BlockHash,
    /// Block timestamp (seconds since the Unix epoch).
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialize to the 80-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash.0);
        out[36..68].copy_from_slice(&self.merkle_root.0);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Parse one 80-byte wire record.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != HEADER_SIZE {
            return Err(CodecError::InvalidLength {
                expected: HEADER_SIZE,
                got: data.len(),
            });
        }
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&data[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&data[36..68]);

        Ok(Self {
            version: i32::from_le_bytes(le4(&data[0..4])),
            prev_hash: BlockHash(prev_hash),
            merkle_root: BlockHash(merkle_root),
            time: u32::from_le_bytes(le4(&data[68..72])),
            bits: u32::from_le_bytes(le4(&data[72..76])),
            nonce: u32::from_le_bytes(le4(&data[76..80])),
        })
    }

    /// Hash of this header (double SHA-256 of the wire form).
    pub fn hash(&self) -> BlockHash {
        BlockHash::double_sha256(&self.to_bytes())
    }

    /// True if `self` declares `parent` as its predecessor.
    pub fn extends(&self, parent: &BlockHeader) -> bool {
        self.prev_hash == parent.hash()
    }

    /// Build a header from the JSON object a Stratum server returns for
    /// `blockchain.block.get_header` and header notifications.
    ///
    /// Extra fields (`block_height`, `utxo_root`, ...) are ignored.
    pub fn from_stratum_json(value: &Value) -> Result<Self, CodecError> {
        let version = json_u64(value, "version")?;
        Ok(Self {
            version: u32::try_from(version)
                .map_err(|_| CodecError::OutOfRange("version"))? as i32,
            prev_hash: BlockHash::from_hex(json_str(value, "prev_block_hash")?)?,
            merkle_root: BlockHash::from_hex(json_str(value, "merkle_root")?)?,
            time: json_u32(value, "timestamp")?,
            bits: json_u32(value, "bits")?,
            nonce: json_u32(value, "nonce")?,
        })
    }

    /// Inverse of [`BlockHeader::from_stratum_json`], tagged with `height`.
    pub fn to_stratum_json(&self, height: u64) -> Value {
        serde_json::json!({
            "block_height": height,
            "version": self.version as u32,
            "prev_block_hash": self.prev_hash.to_hex(),
            "merkle_root": self.merkle_root.to_hex(),
            "timestamp": self.time,
            "bits": self.bits,
            "nonce": self.nonce,
        })
    }
}

/// Decode a hex-encoded run of concatenated headers, as returned by
/// `blockchain.block.get_chunk`.
pub fn decode_chunk(hex_data: &str) -> Result<Vec<BlockHeader>, CodecError> {
    let data = hex::decode(hex_data.trim()).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    if data.len() % HEADER_SIZE != 0 {
        return Err(CodecError::PartialRecord {
            len: data.len(),
            record: HEADER_SIZE,
        });
    }
    data.chunks_exact(HEADER_SIZE)
        .map(BlockHeader::from_bytes)
        .collect()
}

/// Encode headers as a chunk hex string.
pub fn encode_chunk(headers: &[BlockHeader]) -> String {
    let mut data = Vec::with_capacity(headers.len() * HEADER_SIZE);
    for header in headers {
        data.extend_from_slice(&header.to_bytes());
    }
    hex::encode(data)
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    out
}

fn json_u64(value: &Value, field: &'static str) -> Result<u64, CodecError> {
    value
        .get(field)
        .and_then(Value::as_u64)
        .ok_or(CodecError::MissingField(field))
}

fn json_u32(value: &Value, field: &'static str) -> Result<u32, CodecError> {
    u32::try_from(json_u64(value, field)?).map_err(|_| CodecError::OutOfRange(field))
}

fn json_str<'a>(value: &'a Value, field: &'static str) -> Result<&'a str, CodecError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingField(field))
}
