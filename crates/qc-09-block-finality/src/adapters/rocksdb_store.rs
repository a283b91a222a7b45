//! # RocksDB Pieces
//!
//! Durable pieces for [`RotatingKvStore`](super::RotatingKvStore). Piece `N`
//! lives in directory `<base>/<prefix>.N`; on open the highest existing
//! `N` is discovered by scanning `<base>`.

use crate::error::{FinalityError, FinalityResult};
use crate::ports::outbound::{KvPiece, PieceOpener};
use rocksdb::{Options, WriteOptions, DB};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One RocksDB database acting as a store piece
#[derive(Clone)]
pub struct RocksDbPiece {
    db: Arc<DB>,
    sync_writes: bool,
}

impl RocksDbPiece {
    fn property(&self, name: &str) -> FinalityResult<u64> {
        self.db
            .property_int_value(name)
            .map(|value| value.unwrap_or(0))
            .map_err(storage_error)
    }
}

impl KvPiece for RocksDbPiece {
    fn get(&self, key: &[u8]) -> FinalityResult<Option<Vec<u8>>> {
        self.db.get(key).map_err(storage_error)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> FinalityResult<()> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.put_opt(key, value, &write_opts).map_err(storage_error)
    }

    fn approximate_size(&self) -> FinalityResult<u64> {
        let live = self.property("rocksdb.estimate-live-data-size")?;
        let memtables = self.property("rocksdb.cur-size-all-mem-tables")?;
        Ok(live + memtables)
    }
}

/// Opens RocksDB pieces under one base directory
#[derive(Debug, Clone)]
pub struct RocksDbPieceOpener {
    base: PathBuf,
    prefix: String,
    sync_writes: bool,
}

impl RocksDbPieceOpener {
    pub fn new(base: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            prefix: prefix.into(),
            sync_writes: true,
        }
    }

    /// Skip fsync on write (tests)
    pub fn without_sync(mut self) -> Self {
        self.sync_writes = false;
        self
    }

    fn piece_path(&self, index: u64) -> PathBuf {
        self.base.join(format!("{}.{}", self.prefix, index))
    }

    fn parse_index(&self, name: &str) -> Option<u64> {
        name.strip_prefix(&self.prefix)?
            .strip_prefix('.')?
            .parse()
            .ok()
    }
}

impl PieceOpener for RocksDbPieceOpener {
    type Piece = RocksDbPiece;

    fn open(&self, index: u64) -> FinalityResult<RocksDbPiece> {
        std::fs::create_dir_all(&self.base).map_err(storage_error)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = DB::open(&opts, self.piece_path(index)).map_err(storage_error)?;
        Ok(RocksDbPiece {
            db: Arc::new(db),
            sync_writes: self.sync_writes,
        })
    }

    fn highest_existing_index(&self) -> FinalityResult<Option<u64>> {
        if !Path::new(&self.base).exists() {
            return Ok(None);
        }
        let mut highest = None;
        for entry in std::fs::read_dir(&self.base).map_err(storage_error)? {
            let entry = entry.map_err(storage_error)?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(|n| self.parse_index(n)) {
                highest = highest.max(Some(index));
            }
        }
        Ok(highest)
    }

    fn discard(&self, index: u64) -> FinalityResult<()> {
        let path = self.piece_path(index);
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(storage_error)?;
        }
        Ok(())
    }
}

fn storage_error(err: impl std::fmt::Display) -> FinalityError {
    FinalityError::StorageError {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RotatingKvStore;
    use crate::ports::outbound::KeyValueStore;
    use crate::types::RotatingStoreConfig;
    use tempfile::TempDir;

    #[test]
    fn test_discovers_highest_piece() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("shares.3")).unwrap();
        std::fs::create_dir(dir.path().join("shares.11")).unwrap();
        std::fs::create_dir(dir.path().join("other.40")).unwrap();

        let opener = RocksDbPieceOpener::new(dir.path(), "shares");
        assert_eq!(opener.highest_existing_index().unwrap(), Some(11));
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let config = RotatingStoreConfig::default();
        {
            let opener = RocksDbPieceOpener::new(dir.path(), "shares").without_sync();
            let store = RotatingKvStore::open(opener, config.clone()).unwrap();
            store.put(b"BLOCK_SIG:1", b"sig").unwrap();
        }

        let opener = RocksDbPieceOpener::new(dir.path(), "shares").without_sync();
        let store = RotatingKvStore::open(opener, config).unwrap();
        assert_eq!(store.get(b"BLOCK_SIG:1").unwrap(), Some(b"sig".to_vec()));
    }
}
