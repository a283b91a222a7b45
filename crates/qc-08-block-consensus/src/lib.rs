//! # qc-08-block-consensus
//!
//! Block agreement subsystem for Quantum-Chain.
//!
//! ## Architecture
//!
//! For every height, each of the N committee members may propose a block.
//! The coordinator runs one binary Byzantine agreement per proposer ("does
//! proposer P's block enter height H?") and derives the block decision from
//! the child decisions:
//!
//! ```text
//! start_consensus_proposal ──→ [child 1] [child 2] ... [child N]
//!                                  │         │             │
//!                                  └── ChildDecided ───────┘
//!                                            ↓
//!                          priority ring walk from the leader
//!                                            ↓
//!                      BlockDecision ──→ sign share ──→ BlockSignBroadcast
//!                                                            ↓
//!                                   threshold met ──→ ChainAccessor::finalize
//! ```
//!
//! ### Leader fast path
//!
//! When the chain enables it and the winner of height `h - N` is known, only
//! that proposer's agreement runs. A full N-way round is forced every
//! `4N + 1` heights.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qc_08_block_consensus::{BlockConsensusDependencies, BlockConsensusService, ConsensusConfig};
//! use qc_08_block_consensus::ports::BlockConsensusApi;
//!
//! let service = BlockConsensusService::new(BlockConsensusDependencies {
//!     chain,
//!     broadcaster,
//!     finality,
//!     config: ConsensusConfig::default(),
//! });
//!
//! service.start_consensus_proposal(height, proposals).await?;
//! service.route_and_process_message(MessageEnvelope::network(message)).await?;
//! ```
//!
//! ## Safety
//!
//! - A proposer is recorded with at most one value per height; a conflicting
//!   report is a fatal error
//! - A height is decided at most once; later inputs are ignored
//! - Messages for heights past `last_committed + 1` are fatal, messages far
//!   behind it are dropped as stale

pub mod adapters;
pub mod domain;
pub mod leader;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::InMemoryBroadcaster;
pub use domain::{
    BinaryAgreementInstance, BinaryAgreementMessage, BlockDecision, BooleanProposalVector,
    ChildDecision, ConsensusConfig, ConsensusError, ConsensusMessage, ConsensusResult,
    DecisionOutcome, MessageEnvelope, MessageOrigin, Phase, RoundMessageKind,
};
pub use leader::LeaderSelector;
pub use ports::{BlockConsensusApi, ChainAccessor, NetworkBroadcaster, TimeSource};
pub use service::{BlockConsensusDependencies, BlockConsensusService};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consensus_config_default() {
        let config = ConsensusConfig::default();
        assert_eq!(config.max_active_consensuses, 5);
        assert_eq!(config.max_consensus_history, 1024);
    }
}
