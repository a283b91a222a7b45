//! # Signature Share Book
//!
//! In-memory book of received signature shares, keyed by height then by the
//! proposer they sign, then by signer.
//!
//! ## Exactly-once merge
//!
//! Verification and merging happen outside the book (they are slow). The
//! book only answers two questions atomically:
//! - which shares are candidates for a merge right now
//! - whether this caller is the first to mark the height merged
//!
//! Only the caller that wins [`SigShareDb::mark_merged`] reports the
//! threshold, so a height is handed to the chain once.

use crate::domain::sig_share::{AggregateSignature, SigShare};
use shared_types::{Height, ProposerIndex};
use std::collections::{BTreeMap, HashMap};

/// Result of offering a share to the finalization service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareOutcome {
    /// Share kept; threshold not reached yet
    Stored { have: usize, need: usize },
    /// This share completed the threshold; returned only once per height
    ThresholdMet(AggregateSignature),
    /// Same signer already contributed for this block
    Duplicate,
    /// Height already merged; share ignored
    AlreadyMerged,
}

/// Result of inserting into the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { have: usize },
    Duplicate,
    AlreadyMerged,
}

#[derive(Debug, Default)]
struct HeightShares {
    /// proposer -> signer -> share
    by_proposer: HashMap<ProposerIndex, BTreeMap<ProposerIndex, SigShare>>,
    merged: bool,
}

/// Bounded share book.
#[derive(Debug)]
pub struct SigShareDb {
    heights: BTreeMap<Height, HeightShares>,
    max_tracked_heights: usize,
}

impl SigShareDb {
    pub fn new(max_tracked_heights: usize) -> Self {
        Self {
            heights: BTreeMap::new(),
            max_tracked_heights: max_tracked_heights.max(1),
        }
    }

    /// Record a share.
    pub fn insert(&mut self, share: SigShare) -> InsertOutcome {
        let height = share.height;
        let entry = self.heights.entry(height).or_default();
        if entry.merged {
            return InsertOutcome::AlreadyMerged;
        }

        let signers = entry.by_proposer.entry(share.proposer).or_default();
        if signers.contains_key(&share.signer) {
            return InsertOutcome::Duplicate;
        }
        signers.insert(share.signer, share);
        let have = signers.len();

        self.prune();
        InsertOutcome::Inserted { have }
    }

    /// Shares collected for `(height, proposer)`, ordered by signer.
    pub fn candidates(&self, height: Height, proposer: ProposerIndex) -> Vec<SigShare> {
        self.heights
            .get(&height)
            .and_then(|entry| entry.by_proposer.get(&proposer))
            .map(|signers| signers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct signers seen for `(height, proposer)`.
    pub fn share_count(&self, height: Height, proposer: ProposerIndex) -> usize {
        self.heights
            .get(&height)
            .and_then(|entry| entry.by_proposer.get(&proposer))
            .map_or(0, BTreeMap::len)
    }

    /// Flag the height merged. Returns `true` only for the first caller.
    pub fn mark_merged(&mut self, height: Height) -> bool {
        let entry = self.heights.entry(height).or_default();
        if entry.merged {
            return false;
        }
        entry.merged = true;
        // Shares are no longer needed once the aggregate exists
        entry.by_proposer.clear();
        true
    }

    pub fn is_merged(&self, height: Height) -> bool {
        self.heights.get(&height).is_some_and(|entry| entry.merged)
    }

    pub fn tracked_heights(&self) -> usize {
        self.heights.len()
    }

    fn prune(&mut self) {
        while self.heights.len() > self.max_tracked_heights {
            if self.heights.pop_first().is_none() {
                break;
            }
        }
    }
}
