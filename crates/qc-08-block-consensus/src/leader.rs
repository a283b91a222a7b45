//! # Leader Selection
//!
//! Decides per height whether the leader fast path runs, and where the
//! priority ring starts.
//!
//! ## Fast path
//!
//! Leadership tends to be stable across heights, so when the chain enables it
//! the height runs a single agreement for the previous winner (the proposer
//! that won height `h - N`) instead of N agreements. A full N-way round is
//! forced whenever `h % (4N + 1) == 0`, and the fast path never runs when the
//! previous winner is unknown or was the default block.

use crate::domain::{ConsensusError, ConsensusResult};
use crate::ports::ChainAccessor;
use shared_types::{Height, ProposerIndex};
use std::sync::Arc;

/// Fast-path and priority-leader policy over committed history
pub struct LeaderSelector<C: ChainAccessor> {
    chain: Arc<C>,
}

impl<C: ChainAccessor> LeaderSelector<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Whether `height` runs the single-proposer fast path.
    pub fn is_fast_path_active(&self, height: Height, last_block_timestamp_s: u64) -> bool {
        if !self.chain.is_fast_consensus_enabled(last_block_timestamp_s) {
            return false;
        }
        let node_count = self.chain.node_count();
        if height.as_u64() % (4 * node_count + 1) == 0 {
            return false;
        }
        !self.previous_winner(height).is_default()
    }

    /// Fast-path check against the last committed block's timestamp
    pub fn is_fast_path_active_now(&self, height: Height) -> bool {
        self.is_fast_path_active(height, self.chain.last_committed_timestamp_s())
    }

    /// Winner of height `h - N`, or `DEFAULT_BLOCK` when unknown.
    pub fn previous_winner(&self, height: Height) -> ProposerIndex {
        let node_count = self.chain.node_count();
        if height.as_u64() <= node_count {
            return ProposerIndex::DEFAULT_BLOCK;
        }
        self.chain
            .block_at(height.saturating_sub(node_count))
            .map_or(ProposerIndex::DEFAULT_BLOCK, |block| block.proposer)
    }

    /// 0-based start of the priority ring for `height`.
    ///
    /// - fast path: the previous winner
    /// - fast consensus enabled: round robin, `h % N`
    /// - otherwise: first 8 bytes of block `h - 1`'s hash, `% N`
    pub fn priority_leader(&self, height: Height) -> ConsensusResult<u64> {
        let node_count = self.chain.node_count();
        if node_count == 0 {
            return Err(ConsensusError::InvalidState("empty committee".to_string()));
        }
        let timestamp_s = self.chain.last_committed_timestamp_s();

        if self.is_fast_path_active(height, timestamp_s) {
            return Ok(self.previous_winner(height).as_u64() - 1);
        }
        if self.chain.is_fast_consensus_enabled(timestamp_s) {
            return Ok(height.as_u64() % node_count);
        }

        let seed = if height.as_u64() <= 1 {
            1
        } else {
            let previous = height.saturating_sub(1);
            self.chain
                .block_at(previous)
                .ok_or(ConsensusError::MissingBlock(previous))?
                .hash_seed()
        };
        Ok(seed % node_count)
    }

    /// Whether the local node should keep its candidate block to itself:
    /// the height runs the fast path for another proposer.
    pub fn should_skip_broadcasting_own_proposal(&self, height: Height) -> bool {
        self.is_fast_path_active_now(height)
            && self.previous_winner(height) != self.chain.local_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConsensusResult;
    use qc_09_block_finality::AggregateSignature;
    use shared_types::CommittedBlockInfo;
    use std::collections::HashMap;

    struct MockChain {
        node_count: u64,
        local: u64,
        fast: bool,
        blocks: HashMap<u64, CommittedBlockInfo>,
    }

    impl MockChain {
        fn new(node_count: u64, fast: bool) -> Self {
            Self {
                node_count,
                local: 1,
                fast,
                blocks: HashMap::new(),
            }
        }

        fn with_block(mut self, height: u64, proposer: u64, seed: u64) -> Self {
            let mut hash = [0u8; 32];
            hash[..8].copy_from_slice(&seed.to_le_bytes());
            self.blocks.insert(
                height,
                CommittedBlockInfo {
                    height: Height(height),
                    proposer: ProposerIndex(proposer),
                    hash,
                    timestamp_s: 0,
                },
            );
            self
        }
    }

    impl ChainAccessor for MockChain {
        fn last_committed_height(&self) -> Height {
            Height(self.blocks.keys().max().copied().unwrap_or(0))
        }

        fn last_committed_timestamp_s(&self) -> u64 {
            0
        }

        fn block_at(&self, height: Height) -> Option<CommittedBlockInfo> {
            self.blocks.get(&height.as_u64()).cloned()
        }

        fn node_count(&self) -> u64 {
            self.node_count
        }

        fn local_index(&self) -> ProposerIndex {
            ProposerIndex(self.local)
        }

        fn is_fast_consensus_enabled(&self, _timestamp_s: u64) -> bool {
            self.fast
        }

        fn finalize_decided_and_signed_block(
            &self,
            _height: Height,
            _proposer: ProposerIndex,
            _signature: AggregateSignature,
        ) -> ConsensusResult<()> {
            Ok(())
        }
    }

    fn selector(chain: MockChain) -> LeaderSelector<MockChain> {
        LeaderSelector::new(Arc::new(chain))
    }

    #[test]
    fn test_previous_winner_needs_history() {
        let s = selector(MockChain::new(4, true).with_block(1, 3, 0));
        assert_eq!(s.previous_winner(Height(4)), ProposerIndex::DEFAULT_BLOCK);
        assert_eq!(s.previous_winner(Height(5)), ProposerIndex(3));
        // Height 2 unknown
        assert_eq!(s.previous_winner(Height(6)), ProposerIndex::DEFAULT_BLOCK);
    }

    #[test]
    fn test_fast_path_requires_enabled_flag() {
        let s = selector(MockChain::new(4, false).with_block(3, 2, 0));
        assert!(!s.is_fast_path_active(Height(7), 0));
    }

    #[test]
    fn test_fast_path_requires_non_default_winner() {
        let s = selector(MockChain::new(4, true).with_block(3, 0, 0));
        assert!(!s.is_fast_path_active(Height(7), 0));

        let s = selector(MockChain::new(4, true).with_block(3, 2, 0));
        assert!(s.is_fast_path_active(Height(7), 0));
    }

    #[test]
    fn test_full_round_forced_periodically() {
        // 4N + 1 = 17 for N = 4
        let s = selector(MockChain::new(4, true).with_block(13, 2, 0));
        assert!(!s.is_fast_path_active(Height(17), 0));

        let s = selector(MockChain::new(4, true).with_block(14, 2, 0));
        assert!(s.is_fast_path_active(Height(18), 0));
    }

    #[test]
    fn test_priority_leader_fast_path_is_previous_winner() {
        let s = selector(MockChain::new(4, true).with_block(3, 2, 0));
        assert_eq!(s.priority_leader(Height(7)).unwrap(), 1);
    }

    #[test]
    fn test_priority_leader_round_robin_when_enabled() {
        let s = selector(MockChain::new(4, true));
        assert_eq!(s.priority_leader(Height(3)).unwrap(), 3);
        assert_eq!(s.priority_leader(Height(4)).unwrap(), 0);
    }

    #[test]
    fn test_priority_leader_legacy_hash_seed() {
        let s = selector(MockChain::new(4, false).with_block(9, 1, 11));
        assert_eq!(s.priority_leader(Height(10)).unwrap(), 11 % 4);
        assert_eq!(s.priority_leader(Height(1)).unwrap(), 1);
    }

    #[test]
    fn test_priority_leader_missing_block() {
        let s = selector(MockChain::new(4, false));
        assert!(matches!(
            s.priority_leader(Height(10)),
            Err(ConsensusError::MissingBlock(Height(9)))
        ));
    }

    #[test]
    fn test_skip_broadcast_only_for_non_designated() {
        let s = selector(MockChain::new(4, true).with_block(3, 2, 0));
        // Local node is 1, designated is 2
        assert!(s.should_skip_broadcasting_own_proposal(Height(7)));

        let mut chain = MockChain::new(4, true).with_block(3, 2, 0);
        chain.local = 2;
        assert!(!selector(chain).should_skip_broadcasting_own_proposal(Height(7)));

        // Normal path: everyone broadcasts
        assert!(!selector(MockChain::new(4, false)).should_skip_broadcasting_own_proposal(Height(7)));
    }
}
