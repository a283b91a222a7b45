//! # Decision History
//!
//! Bounded per-height state of the coordinator:
//! - one LRU of height records (phase, decision set, block decision)
//! - one LRU of child agreements per proposer slot
//!
//! Callers only get short-lived borrows; nothing outside the history holds a
//! handle to a record or child, so eviction never leaves a dangling
//! reference. Evicted state is dropped silently: a decided height has
//! already been handed to finalization by then.

use super::{BinaryAgreementInstance, BlockDecision, DecisionSet, Phase};
use lru::LruCache;
use shared_types::{AgreementKey, Height};
use std::num::NonZeroUsize;
use tracing::debug;

/// Coordinator state of one height
#[derive(Debug, Default)]
pub struct HeightRecord {
    pub phase: Phase,
    pub decisions: DecisionSet,
    pub decision: Option<BlockDecision>,
}

/// LRU-bounded history of heights and their child agreements
pub struct DecisionHistory {
    records: LruCache<Height, HeightRecord>,
    children: Vec<LruCache<Height, BinaryAgreementInstance>>,
}

impl DecisionHistory {
    pub fn new(capacity: usize, node_count: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: LruCache::new(capacity),
            children: (0..node_count).map(|_| LruCache::new(capacity)).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.records.cap().get()
    }

    /// Record for `height`, created if absent (may evict the oldest height).
    pub fn record_mut(&mut self, height: Height) -> &mut HeightRecord {
        if !self.records.contains(&height) && self.records.len() == self.capacity() {
            if let Some((evicted, record)) = self.records.peek_lru() {
                debug!(
                    height = %evicted,
                    phase = ?record.phase,
                    "Evicting height from decision history"
                );
            }
        }
        self.records.get_or_insert_mut(height, HeightRecord::default)
    }

    /// Record for `height` without touching recency
    pub fn record(&self, height: Height) -> Option<&HeightRecord> {
        self.records.peek(&height)
    }

    /// Child for `key`, created with `create` if absent.
    ///
    /// `key.proposer` must already be validated against the committee size.
    pub fn child_mut(
        &mut self,
        key: AgreementKey,
        create: impl FnOnce() -> BinaryAgreementInstance,
    ) -> Option<&mut BinaryAgreementInstance> {
        let cache = self.children.get_mut(key.proposer.slot())?;
        Some(cache.get_or_insert_mut(key.height, create))
    }

    /// Child for `key` without creating it or touching recency
    pub fn child(&self, key: AgreementKey) -> Option<&BinaryAgreementInstance> {
        self.children.get(key.proposer.slot())?.peek(&key.height)
    }

    pub fn contains(&self, height: Height) -> bool {
        self.records.contains(&height)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ProposerIndex;

    #[test]
    fn test_oldest_height_evicted() {
        let mut history = DecisionHistory::new(3, 4);
        for h in 1..=4 {
            history.record_mut(Height(h)).phase = Phase::Decided;
        }
        assert_eq!(history.len(), 3);
        assert!(!history.contains(Height(1)));
        assert!(history.record(Height(4)).is_some());
    }

    #[test]
    fn test_access_refreshes_recency() {
        let mut history = DecisionHistory::new(2, 4);
        history.record_mut(Height(1));
        history.record_mut(Height(2));
        history.record_mut(Height(1));
        history.record_mut(Height(3));
        assert!(history.contains(Height(1)));
        assert!(!history.contains(Height(2)));
    }

    #[test]
    fn test_children_created_lazily_per_proposer() {
        let mut history = DecisionHistory::new(4, 4);
        let key = AgreementKey::new(Height(2), ProposerIndex(3), 4).unwrap();
        assert!(history.child(key).is_none());

        let child = history
            .child_mut(key, || BinaryAgreementInstance::new(key, 4, ProposerIndex(1), 8))
            .unwrap();
        assert_eq!(child.key(), key);
        assert!(history.child(key).is_some());

        let other = AgreementKey::new(Height(2), ProposerIndex(4), 4).unwrap();
        assert!(history.child(other).is_none());
    }

    #[test]
    fn test_children_bounded() {
        let mut history = DecisionHistory::new(2, 1);
        for h in 1..=3 {
            let key = AgreementKey::new(Height(h), ProposerIndex(1), 1).unwrap();
            history.child_mut(key, || BinaryAgreementInstance::new(key, 1, ProposerIndex(1), 8));
        }
        let first = AgreementKey::new(Height(1), ProposerIndex(1), 1).unwrap();
        assert!(history.child(first).is_none());
    }
}
