//! In-memory header store.
//!
//! Used by tests and by the runtime when no store path is configured.

use crate::domain::StoreError;
use crate::ports::HeaderStore;
use crate::DEFAULT_VERIFY_DEPTH;
use shared_types::{BlockHash, BlockHeader};
use tracing::debug;

/// Vector-backed header store starting at a base header.
#[derive(Debug, Clone)]
pub struct MemoryHeaderStore {
    /// Height of `headers[0]`.
    base: u64,
    /// Headers from `base` upwards.
    headers: Vec<BlockHeader>,
    /// Cached hashes, parallel to `headers`.
    hashes: Vec<BlockHash>,
    /// Tail length checked by `verify_last`.
    verify_depth: u64,
    closed: bool,
}

impl MemoryHeaderStore {
    /// Create a store holding only `genesis` at height 0.
    pub fn new(genesis: BlockHeader) -> Self {
        Self::with_base(0, genesis)
    }

    /// Create a store whose first header sits at `base` (a checkpoint).
    pub fn with_base(base: u64, header: BlockHeader) -> Self {
        Self {
            base,
            hashes: vec![header.hash()],
            headers: vec![header],
            verify_depth: DEFAULT_VERIFY_DEPTH,
            closed: false,
        }
    }

    /// Build a store from a linked run of headers starting at `base`.
    ///
    /// Headers that do not link are rejected with `BrokenLink`.
    pub fn from_headers(base: u64, headers: &[BlockHeader]) -> Result<Self, StoreError> {
        let Some((first, rest)) = headers.split_first() else {
            return Err(StoreError::Corrupted("no base header".to_string()));
        };
        let mut store = Self::with_base(base, *first);
        for header in rest {
            if !store.add(*header)? {
                return Err(StoreError::BrokenLink {
                    height: store.height() + 1,
                });
            }
        }
        Ok(store)
    }

    /// Override the tail length checked by `verify_last`.
    pub fn with_verify_depth(mut self, depth: u64) -> Self {
        self.verify_depth = depth;
        self
    }

    /// True once `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn index(&self, height: u64) -> Result<usize, StoreError> {
        if height < self.base || height > self.height() {
            return Err(StoreError::OutOfRange {
                height,
                base: self.base,
                top: self.height(),
            });
        }
        Ok((height - self.base) as usize)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl HeaderStore for MemoryHeaderStore {
    fn verify_last(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let len = self.headers.len();
        let depth = (self.verify_depth as usize).min(len.saturating_sub(1));
        for i in (len - depth)..len {
            if self.headers[i].prev_hash != self.hashes[i - 1] {
                return Err(StoreError::BrokenLink {
                    height: self.base + i as u64,
                });
            }
        }
        Ok(())
    }

    fn height(&self) -> u64 {
        self.base + self.headers.len() as u64 - 1
    }

    fn top(&self) -> BlockHeader {
        self.headers[self.headers.len() - 1]
    }

    fn get(&self, height: u64) -> Result<BlockHeader, StoreError> {
        self.ensure_open()?;
        let index = self.index(height)?;
        Ok(self.headers[index])
    }

    fn add(&mut self, header: BlockHeader) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let tip = self.hashes[self.hashes.len() - 1];
        if header.prev_hash != tip {
            debug!(
                height = self.height() + 1,
                tip = %tip,
                prev = %header.prev_hash,
                "Rejected header: predecessor mismatch"
            );
            return Ok(false);
        }
        self.hashes.push(header.hash());
        self.headers.push(header);
        Ok(true)
    }

    fn truncate(&mut self, height: u64) -> Result<(), StoreError> {
        self.ensure_open()?;
        if height < self.base {
            return Err(StoreError::BelowBase {
                height,
                base: self.base,
            });
        }
        let keep = ((height - self.base) as usize + 1).min(self.headers.len());
        self.headers.truncate(keep);
        self.hashes.truncate(keep);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }

    fn base_height(&self) -> u64 {
        self.base
    }
}
