//! # Flat-File Header Store
//!
//! Headers are stored as consecutive 80-byte records, record `n` holding
//! height `n`, the same layout Electrum-style wallets use for
//! `blockchain_headers`. Uses `fs2` to hold an exclusive lock on the file
//! for the lifetime of the store.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use shared_types::{BlockHash, BlockHeader, HEADER_SIZE};
use tracing::{debug, info, warn};

use crate::domain::StoreError;
use crate::ports::HeaderStore;
use crate::DEFAULT_VERIFY_DEPTH;

/// File-backed header store.
pub struct FileHeaderStore {
    /// Open data file (locked while `Some`).
    file: Option<File>,
    /// Path of the data file.
    path: PathBuf,
    /// Number of records in the file.
    records: u64,
    /// Cached tip header.
    top: BlockHeader,
    /// Cached tip hash.
    top_hash: BlockHash,
    /// Tail length checked by `verify_last`.
    verify_depth: u64,
}

impl FileHeaderStore {
    /// Open (or create) the store at `path`.
    ///
    /// A new file is initialized with `genesis`. An existing file must start
    /// with `genesis` and hold only whole records.
    ///
    /// # Errors
    ///
    /// - `Locked` if another process holds the file
    /// - `Corrupted` on a partial trailing record or a foreign genesis
    pub fn open(path: impl AsRef<Path>, genesis: BlockHeader) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path));
        }

        let len = file.metadata()?.len();
        if len % HEADER_SIZE as u64 != 0 {
            return Err(StoreError::Corrupted(format!(
                "{} bytes is not a whole number of headers",
                len
            )));
        }

        if len == 0 {
            file.write_all(&genesis.to_bytes())?;
            file.flush()?;
            info!(path = %path.display(), "Initialized header store");
        }

        let mut store = Self {
            file: Some(file),
            path,
            records: (len / HEADER_SIZE as u64).max(1),
            top: genesis,
            top_hash: genesis.hash(),
            verify_depth: DEFAULT_VERIFY_DEPTH,
        };

        let stored_genesis = store.read_record(0)?;
        if stored_genesis != genesis {
            return Err(StoreError::Corrupted(format!(
                "genesis mismatch: stored {}, expected {}",
                stored_genesis.hash(),
                genesis.hash()
            )));
        }

        let top = store.read_record(store.records - 1)?;
        store.top = top;
        store.top_hash = top.hash();
        info!(
            path = %store.path.display(),
            height = store.height(),
            "Opened header store"
        );
        Ok(store)
    }

    /// Override the tail length checked by `verify_last`.
    pub fn with_verify_depth(mut self, depth: u64) -> Self {
        self.verify_depth = depth;
        self
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> Result<&File, StoreError> {
        self.file.as_ref().ok_or(StoreError::Closed)
    }

    fn read_record(&self, height: u64) -> Result<BlockHeader, StoreError> {
        let mut file = self.file()?;
        let mut buf = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(height * HEADER_SIZE as u64))?;
        file.read_exact(&mut buf)?;
        Ok(BlockHeader::from_bytes(&buf)?)
    }

    fn read_range(&self, from: u64, count: u64) -> Result<Vec<BlockHeader>, StoreError> {
        let mut file = self.file()?;
        let mut buf = vec![0u8; (count as usize) * HEADER_SIZE];
        file.seek(SeekFrom::Start(from * HEADER_SIZE as u64))?;
        file.read_exact(&mut buf)?;
        buf.chunks_exact(HEADER_SIZE)
            .map(|record| BlockHeader::from_bytes(record).map_err(StoreError::from))
            .collect()
    }
}

/// Seekable sink whose length can be cut back after a failed write.
trait RecordSink: Write + Seek {
    fn cut(&mut self, len: u64) -> io::Result<()>;
}

impl RecordSink for &File {
    fn cut(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write one record at `offset`. A failed write leaves no partial record.
fn append_record(
    sink: &mut impl RecordSink,
    offset: u64,
    record: &[u8],
) -> Result<(), StoreError> {
    sink.seek(SeekFrom::Start(offset))?;
    if let Err(e) = sink.write_all(record) {
        sink.cut(offset)?;
        warn!(offset, error = %e, "Header write failed, rolled back");
        return Err(e.into());
    }
    Ok(())
}

impl HeaderStore for FileHeaderStore {
    fn verify_last(&self) -> Result<(), StoreError> {
        self.file()?;
        let depth = self.verify_depth.min(self.records - 1);
        if depth == 0 {
            return Ok(());
        }
        let from = self.records - 1 - depth;
        let tail = self.read_range(from, depth + 1)?;
        for (offset, pair) in tail.windows(2).enumerate() {
            if !pair[1].extends(&pair[0]) {
                let height = from + offset as u64 + 1;
                warn!(height, "Header store tail is broken");
                return Err(StoreError::BrokenLink { height });
            }
        }
        debug!(depth, "Verified header store tail");
        Ok(())
    }

    fn height(&self) -> u64 {
        self.records - 1
    }

    fn top(&self) -> BlockHeader {
        self.top
    }

    fn get(&self, height: u64) -> Result<BlockHeader, StoreError> {
        self.file()?;
        if height >= self.records {
            return Err(StoreError::OutOfRange {
                height,
                base: 0,
                top: self.height(),
            });
        }
        if height == self.records - 1 {
            return Ok(self.top);
        }
        self.read_record(height)
    }

    fn add(&mut self, header: BlockHeader) -> Result<bool, StoreError> {
        let mut file = self.file()?;
        if header.prev_hash != self.top_hash {
            return Ok(false);
        }
        append_record(&mut file, self.records * HEADER_SIZE as u64, &header.to_bytes())?;
        self.records += 1;
        self.top = header;
        self.top_hash = header.hash();
        Ok(true)
    }

    fn truncate(&mut self, height: u64) -> Result<(), StoreError> {
        let file = self.file()?;
        if height >= self.records {
            return Ok(());
        }
        file.set_len((height + 1) * HEADER_SIZE as u64)?;
        self.records = height + 1;
        let top = self.read_record(height)?;
        self.top = top;
        self.top_hash = top.hash();
        debug!(height, "Truncated header store");
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            FileExt::unlock(&file)?;
            info!(path = %self.path.display(), height = self.height(), "Closed header store");
        }
        Ok(())
    }
}

impl Drop for FileHeaderStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close header store");
        }
    }
}
