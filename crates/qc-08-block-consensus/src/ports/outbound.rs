//! Driven ports (Outbound dependencies)

use crate::domain::{ConsensusMessage, ConsensusResult};
use async_trait::async_trait;
use qc_09_block_finality::AggregateSignature;
use shared_types::{CommittedBlockInfo, Height, ProposerIndex};

/// Network broadcaster.
///
/// At-least-once, unordered, no delivery guarantee. Messages are not echoed
/// back to the sender.
#[async_trait]
pub trait NetworkBroadcaster: Send + Sync {
    async fn broadcast(&self, message: ConsensusMessage) -> ConsensusResult<()>;
}

/// The surrounding chain: committed ledger, committee and commit handoff.
pub trait ChainAccessor: Send + Sync {
    fn last_committed_height(&self) -> Height;

    /// Unix timestamp (seconds) of the last committed block
    fn last_committed_timestamp_s(&self) -> u64;

    fn block_at(&self, height: Height) -> Option<CommittedBlockInfo>;

    fn node_count(&self) -> u64;

    fn local_index(&self) -> ProposerIndex;

    /// Whether the leader fast path is enabled for blocks after `timestamp_s`
    fn is_fast_consensus_enabled(&self, timestamp_s: u64) -> bool;

    /// Commit a decided block with its merged signature
    fn finalize_decided_and_signed_block(
        &self,
        height: Height,
        proposer: ProposerIndex,
        signature: AggregateSignature,
    ) -> ConsensusResult<()>;
}

/// Time source for latency diagnostics
pub trait TimeSource: Send + Sync {
    /// Current unix time in milliseconds
    fn now_ms(&self) -> u64;
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
