//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports: storage pieces and a development
//! threshold signer.

mod hash_signer;
#[cfg(feature = "rocksdb")]
mod rocksdb_store;
mod rotating_store;

pub use hash_signer::HashThresholdSigner;
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::{RocksDbPiece, RocksDbPieceOpener};
pub use rotating_store::{MemoryPiece, MemoryPieceOpener, RotatingKvStore, RotatingMemoryStore};
