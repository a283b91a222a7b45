//! # Rotating Key/Value Store
//!
//! A store made of numbered pieces. Writes go to the newest piece; reads
//! search newest to oldest. Once the newest piece grows past
//! `max_piece_size`, a new piece is opened and, when more than `pieces`
//! exist, the oldest is dropped.
//!
//! Old signature shares therefore age out without any explicit deletes.

use crate::error::FinalityResult;
use crate::ports::outbound::{KeyValueStore, KvPiece, PieceOpener};
use crate::types::RotatingStoreConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Rotating store over pieces produced by `O`.
pub struct RotatingKvStore<O: PieceOpener> {
    config: RotatingStoreConfig,
    opener: O,
    /// (index, piece), oldest at the front
    pieces: RwLock<VecDeque<(u64, O::Piece)>>,
}

impl<O: PieceOpener> RotatingKvStore<O> {
    /// Open the newest `config.pieces` pieces, creating piece 1 if none exist.
    pub fn open(opener: O, config: RotatingStoreConfig) -> FinalityResult<Self> {
        let keep = config.pieces.max(1) as u64;
        let top = opener.highest_existing_index()?.unwrap_or(1).max(1);
        let first = top.saturating_sub(keep - 1).max(1);

        let mut pieces = VecDeque::with_capacity(keep as usize);
        for index in first..=top {
            pieces.push_back((index, opener.open(index)?));
        }

        info!(first, top, "Opened rotating store");

        Ok(Self {
            config: RotatingStoreConfig {
                pieces: keep as usize,
                ..config
            },
            opener,
            pieces: RwLock::new(pieces),
        })
    }

    /// Index of the piece currently receiving writes
    pub fn active_index(&self) -> u64 {
        self.pieces.read().back().map_or(0, |(index, _)| *index)
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.read().len()
    }

    fn rotate_if_full(&self) -> FinalityResult<()> {
        let mut pieces = self.pieces.write();
        let (top, full) = match pieces.back() {
            Some((index, active)) => (*index, active.approximate_size()? > self.config.max_piece_size),
            None => return Ok(()),
        };
        if !full {
            return Ok(());
        }

        let next = top + 1;
        let piece = self.opener.open(next)?;
        pieces.push_back((next, piece));

        while pieces.len() > self.config.pieces {
            if let Some((dropped, _)) = pieces.pop_front() {
                self.opener.discard(dropped)?;
                debug!(dropped, "Rotated out store piece");
            }
        }

        crate::metrics::record_store_rotation();
        info!(active = next, "Rotated store to new piece");
        Ok(())
    }
}

impl<O: PieceOpener> KeyValueStore for RotatingKvStore<O> {
    fn get(&self, key: &[u8]) -> FinalityResult<Option<Vec<u8>>> {
        let pieces = self.pieces.read();
        for (_, piece) in pieces.iter().rev() {
            if let Some(value) = piece.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> FinalityResult<()> {
        {
            let pieces = self.pieces.read();
            if let Some((_, active)) = pieces.back() {
                active.put(key, value)?;
            }
        }
        self.rotate_if_full()
    }
}

// =============================================================================
// IN-MEMORY PIECES
// =============================================================================

/// In-memory piece. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryPiece {
    entries: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
    size: Arc<AtomicU64>,
}

impl KvPiece for MemoryPiece {
    fn get(&self, key: &[u8]) -> FinalityResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> FinalityResult<()> {
        let previous = self.entries.write().insert(key.to_vec(), value.to_vec());
        let added = (key.len() + value.len()) as u64;
        match previous {
            Some(old) => {
                let removed = (key.len() + old.len()) as u64;
                self.size.fetch_add(added, Ordering::SeqCst);
                self.size.fetch_sub(removed, Ordering::SeqCst);
            }
            None => {
                self.size.fetch_add(added, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn approximate_size(&self) -> FinalityResult<u64> {
        Ok(self.size.load(Ordering::SeqCst))
    }
}

/// Opens in-memory pieces. Reopening an index returns the same piece, so a
/// store reopened over the same opener sees earlier writes.
#[derive(Clone, Default)]
pub struct MemoryPieceOpener {
    pieces: Arc<Mutex<HashMap<u64, MemoryPiece>>>,
}

impl MemoryPieceOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices currently held
    pub fn live_indices(&self) -> Vec<u64> {
        let mut indices: Vec<u64> = self.pieces.lock().keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

impl PieceOpener for MemoryPieceOpener {
    type Piece = MemoryPiece;

    fn open(&self, index: u64) -> FinalityResult<MemoryPiece> {
        Ok(self.pieces.lock().entry(index).or_default().clone())
    }

    fn highest_existing_index(&self) -> FinalityResult<Option<u64>> {
        Ok(self.pieces.lock().keys().max().copied())
    }

    fn discard(&self, index: u64) -> FinalityResult<()> {
        self.pieces.lock().remove(&index);
        Ok(())
    }
}

/// Rotating store backed by memory pieces
pub type RotatingMemoryStore = RotatingKvStore<MemoryPieceOpener>;

impl RotatingMemoryStore {
    pub fn in_memory(config: RotatingStoreConfig) -> FinalityResult<Self> {
        Self::open(MemoryPieceOpener::new(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(pieces: usize) -> RotatingStoreConfig {
        RotatingStoreConfig {
            pieces,
            max_piece_size: 32,
        }
    }

    #[test]
    fn test_put_then_get() {
        let store = RotatingMemoryStore::in_memory(RotatingStoreConfig::default()).unwrap();
        store.put(b"key", b"value").unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
        assert_eq!(store.active_index(), 1);
    }

    #[test]
    fn test_rotates_when_active_piece_full() {
        let store = RotatingMemoryStore::in_memory(small_config(4)).unwrap();
        // 40 bytes > 32 byte limit
        store.put(b"k1", &[0u8; 38]).unwrap();
        assert_eq!(store.active_index(), 2);
        assert_eq!(store.piece_count(), 2);

        // Older piece still readable
        assert!(store.get(b"k1").unwrap().is_some());
    }

    #[test]
    fn test_newest_piece_wins_on_read() {
        let store = RotatingMemoryStore::in_memory(small_config(4)).unwrap();
        store.put(b"k", &[1u8; 40]).unwrap();
        store.put(b"k", b"fresh").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"fresh".to_vec()));
    }

    #[test]
    fn test_oldest_piece_dropped_past_limit() {
        let opener = MemoryPieceOpener::new();
        let store = RotatingKvStore::open(opener.clone(), small_config(2)).unwrap();

        store.put(b"first", &[0u8; 40]).unwrap(); // -> piece 2
        store.put(b"second", &[0u8; 40]).unwrap(); // -> piece 3, piece 1 dropped

        assert_eq!(store.piece_count(), 2);
        assert_eq!(opener.live_indices(), vec![2, 3]);
        assert_eq!(store.get(b"first").unwrap(), None);
        assert!(store.get(b"second").unwrap().is_some());
    }

    #[test]
    fn test_reopen_resumes_from_highest_piece() {
        let opener = MemoryPieceOpener::new();
        {
            let store = RotatingKvStore::open(opener.clone(), small_config(3)).unwrap();
            store.put(b"a", &[0u8; 40]).unwrap();
            store.put(b"b", b"small").unwrap();
        }

        let reopened = RotatingKvStore::open(opener, small_config(3)).unwrap();
        assert_eq!(reopened.active_index(), 2);
        assert_eq!(reopened.get(b"b").unwrap(), Some(b"small".to_vec()));
        assert!(reopened.get(b"a").unwrap().is_some());
    }
}
