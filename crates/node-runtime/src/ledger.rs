//! # In-Memory Ledger
//!
//! The committed chain of one node. Implements the consensus `ChainAccessor`
//! port: it answers leader-selection queries and accepts decided blocks whose
//! merged signature verifies.

use parking_lot::RwLock;
use qc_08_block_consensus::{ChainAccessor, ConsensusError, ConsensusResult};
use qc_09_block_finality::{block_signing_message, AggregateSignature, ThresholdSigner};
use sha3::{Digest, Sha3_256};
use shared_types::{CommittedBlockInfo, Hash, Height, ProposerIndex};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Committed chain of one node
pub struct InMemoryLedger<S: ThresholdSigner> {
    node_count: u64,
    local: ProposerIndex,
    fast_consensus: bool,
    signer: Arc<S>,
    blocks: RwLock<BTreeMap<Height, CommittedBlockInfo>>,
    commits: watch::Sender<Height>,
}

impl<S: ThresholdSigner> InMemoryLedger<S> {
    pub fn new(node_count: u64, local: ProposerIndex, fast_consensus: bool, signer: Arc<S>) -> Self {
        let (commits, _) = watch::channel(Height::GENESIS);
        Self {
            node_count,
            local,
            fast_consensus,
            signer,
            blocks: RwLock::new(BTreeMap::new()),
            commits,
        }
    }

    /// Receiver that observes the last committed height
    pub fn subscribe_commits(&self) -> watch::Receiver<Height> {
        self.commits.subscribe()
    }

    /// Every committed block, lowest height first
    pub fn blocks(&self) -> Vec<CommittedBlockInfo> {
        self.blocks.read().values().cloned().collect()
    }

    fn block_hash(parent: &Hash, height: Height, proposer: ProposerIndex, signature: &[u8]) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(parent);
        hasher.update(height.as_u64().to_le_bytes());
        hasher.update(proposer.as_u64().to_le_bytes());
        hasher.update(signature);
        hasher.finalize().into()
    }
}

impl<S: ThresholdSigner> ChainAccessor for InMemoryLedger<S> {
    fn last_committed_height(&self) -> Height {
        self.blocks
            .read()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(Height::GENESIS)
    }

    fn last_committed_timestamp_s(&self) -> u64 {
        self.blocks
            .read()
            .values()
            .next_back()
            .map_or(0, |block| block.timestamp_s)
    }

    fn block_at(&self, height: Height) -> Option<CommittedBlockInfo> {
        self.blocks.read().get(&height).cloned()
    }

    fn node_count(&self) -> u64 {
        self.node_count
    }

    fn local_index(&self) -> ProposerIndex {
        self.local
    }

    fn is_fast_consensus_enabled(&self, _timestamp_s: u64) -> bool {
        self.fast_consensus
    }

    fn finalize_decided_and_signed_block(
        &self,
        height: Height,
        proposer: ProposerIndex,
        signature: AggregateSignature,
    ) -> ConsensusResult<()> {
        let message = block_signing_message(height, proposer);
        if signature.height != height
            || signature.proposer != proposer
            || !self.signer.verify(&signature, &message)
        {
            return Err(ConsensusError::Chain(format!(
                "signature does not match block {height}:{proposer}"
            )));
        }

        let mut blocks = self.blocks.write();
        let (last, parent) = blocks
            .iter()
            .next_back()
            .map_or((Height::GENESIS, [0u8; 32]), |(h, block)| (*h, block.hash));
        if height != last.next() {
            return Err(ConsensusError::Chain(format!(
                "block {height} does not extend last committed {last}"
            )));
        }

        let block = CommittedBlockInfo {
            height,
            proposer,
            hash: Self::block_hash(&parent, height, proposer, &signature.bytes),
            timestamp_s: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        };
        info!(
            node = %self.local,
            %height,
            %proposer,
            hash = %hex::encode(&block.hash[..8]),
            "Committed block"
        );
        blocks.insert(height, block);
        drop(blocks);

        self.commits.send_replace(height);
        Ok(())
    }
}
