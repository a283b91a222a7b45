//! Driving ports (Inbound API)

use crate::domain::{
    BlockDecision, BooleanProposalVector, ChildDecision, ConsensusResult, DecisionOutcome,
    MessageEnvelope, Phase,
};
use async_trait::async_trait;
use shared_types::{AgreementKey, Height, ProposerIndex};

/// Block consensus coordinator API
///
/// Every operation wraps failures as fatal errors carrying the operation
/// and height, except a shutdown request, which is returned as is.
#[async_trait]
pub trait BlockConsensusApi: Send + Sync {
    /// Start the per-proposer agreements for `height`.
    ///
    /// On a fast-path height only the designated proposer's agreement starts.
    /// A height that is already committed returns `Stale`.
    async fn start_consensus_proposal(
        &self,
        height: Height,
        proposals: BooleanProposalVector,
    ) -> ConsensusResult<DecisionOutcome>;

    /// Route one inbound message to the child agreement or block-level handler
    async fn route_and_process_message(
        &self,
        envelope: MessageEnvelope,
    ) -> ConsensusResult<DecisionOutcome>;

    /// Record a child decision and decide the block if the rule allows
    async fn report_and_maybe_decide(
        &self,
        decision: ChildDecision,
    ) -> ConsensusResult<DecisionOutcome>;

    /// Decide `height` for `proposer`; no-op if already decided
    async fn decide_block(
        &self,
        height: Height,
        proposer: ProposerIndex,
        stats: String,
    ) -> ConsensusResult<DecisionOutcome>;

    /// Decide the default block for `height`; no-op if already decided
    async fn decide_default_block(&self, height: Height) -> ConsensusResult<DecisionOutcome>;

    /// Current round of a child agreement (0 if it does not exist)
    fn current_round(&self, key: AgreementKey) -> u64;

    /// Whether a child agreement has decided
    fn is_decided(&self, key: AgreementKey) -> bool;

    /// Block decision of a height, while it is in the history
    fn decision(&self, height: Height) -> Option<BlockDecision>;

    fn phase(&self, height: Height) -> Phase;
}
