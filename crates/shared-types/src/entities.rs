//! # Core Domain Entities
//!
//! Identifiers used by every block agreement component.
//!
//! ## Clusters
//!
//! - **Identity**: `Height`, `ProposerIndex`, `AgreementKey`
//! - **Chain**: `Hash`, `CommittedBlockInfo`

use crate::errors::IdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte hash (SHA3-256 throughout the agreement core).
pub type Hash = [u8; 32];

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Block height: one block is decided per height.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Height(pub u64);

impl Height {
    /// Genesis sits at height zero; consensus starts at one.
    pub const GENESIS: Height = Height(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn saturating_sub(self, delta: u64) -> Self {
        Self(self.0.saturating_sub(delta))
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a node inside the chain committee, 1..=N.
///
/// Zero is reserved for "no winner": a height decided with
/// `ProposerIndex::DEFAULT_BLOCK` commits the empty default block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ProposerIndex(pub u64);

impl ProposerIndex {
    /// Marker for the default (empty) block.
    pub const DEFAULT_BLOCK: ProposerIndex = ProposerIndex(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_default(self) -> bool {
        self.0 == 0
    }

    /// Position in zero-based per-proposer arrays.
    ///
    /// Only valid for a real proposer; callers validate with
    /// [`ProposerIndex::checked`] first.
    pub fn slot(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Validate that this index names a real proposer of an `node_count` committee.
    pub fn checked(self, node_count: u64) -> Result<Self, IdError> {
        if self.0 == 0 {
            return Err(IdError::ZeroProposerIndex);
        }
        if self.0 > node_count {
            return Err(IdError::ProposerOutOfRange {
                index: self.0,
                node_count,
            });
        }
        Ok(self)
    }

    /// Iterate over all real proposers `1..=node_count`.
    pub fn all(node_count: u64) -> impl Iterator<Item = ProposerIndex> {
        (1..=node_count).map(ProposerIndex)
    }
}

impl From<u64> for ProposerIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProposerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one binary agreement: "does `proposer`'s block enter `height`?"
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AgreementKey {
    pub height: Height,
    pub proposer: ProposerIndex,
}

impl AgreementKey {
    /// Build a key for a real proposer.
    pub fn new(height: Height, proposer: ProposerIndex, node_count: u64) -> Result<Self, IdError> {
        if height == Height::GENESIS {
            return Err(IdError::ZeroHeight);
        }
        let proposer = proposer.checked(node_count)?;
        Ok(Self { height, proposer })
    }
}

impl fmt::Display for AgreementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.height, self.proposer)
    }
}

// =============================================================================
// CLUSTER B: THE CHAIN
// =============================================================================

/// Summary of a committed block, as read back from the chain ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedBlockInfo {
    pub height: Height,
    /// Winning proposer, or `DEFAULT_BLOCK` for an empty block.
    pub proposer: ProposerIndex,
    pub hash: Hash,
    /// Unix timestamp (seconds) of the block.
    pub timestamp_s: u64,
}

impl CommittedBlockInfo {
    /// First eight bytes of the block hash, little-endian.
    ///
    /// Used as the legacy priority-leader seed for the following height.
    pub fn hash_seed(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.hash[..8]);
        u64::from_le_bytes(prefix)
    }
}
