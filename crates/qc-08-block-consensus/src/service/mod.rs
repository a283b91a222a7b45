//! Block Consensus Service - block agreement coordinator
//!
//! # Architecture
//! - One binary agreement per (height, proposer), owned by the history
//! - Decision rules applied under a single state lock
//! - Signing, broadcast and chain handoff outside the lock
//!
//! # Flow per height
//! 1. `start_consensus_proposal` seeds the children with the local votes
//! 2. Round messages from peers are routed to their child
//! 3. Child decisions are recorded until the decision rule picks a block
//! 4. The decided block is signed and the share broadcast; once enough shares
//!    merge the block is handed to the chain

use crate::domain::{
    decide_normal, decide_optimized, AgreementStep, BinaryAgreementInstance,
    BinaryAgreementMessage, BlockDecision, BooleanProposalVector, ChildDecision, ConsensusConfig,
    ConsensusError, ConsensusMessage, ConsensusResult, DecisionHistory, DecisionOutcome,
    HeightRecord, MessageEnvelope, MessageOrigin, Phase, RecordOutcome, RuleOutcome,
};
use crate::leader::LeaderSelector;
use crate::metrics;
use crate::ports::{
    BlockConsensusApi, ChainAccessor, NetworkBroadcaster, SystemTimeSource, TimeSource,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use qc_09_block_finality::{
    AggregateSignature, FinalityError, FinalizationApi, ShareOutcome, SigShare,
};
use shared_types::{AgreementKey, Height, ProposerIndex, ShutdownSignal};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Block consensus coordinator
pub struct BlockConsensusService<C, B, F>
where
    C: ChainAccessor,
    B: NetworkBroadcaster,
    F: FinalizationApi,
{
    chain: Arc<C>,
    broadcaster: Arc<B>,
    finality: Arc<F>,
    leader: LeaderSelector<C>,
    state: Mutex<DecisionHistory>,
    config: ConsensusConfig,
    time_source: Box<dyn TimeSource>,
    shutdown: ShutdownSignal,
}

/// Dependencies for BlockConsensusService
pub struct BlockConsensusDependencies<C, B, F> {
    pub chain: Arc<C>,
    pub broadcaster: Arc<B>,
    pub finality: Arc<F>,
    pub config: ConsensusConfig,
}

impl<C, B, F> BlockConsensusService<C, B, F>
where
    C: ChainAccessor,
    B: NetworkBroadcaster,
    F: FinalizationApi,
{
    pub fn new(deps: BlockConsensusDependencies<C, B, F>) -> Self {
        let history = DecisionHistory::new(
            deps.config.max_consensus_history,
            deps.chain.node_count(),
        );
        Self {
            leader: LeaderSelector::new(Arc::clone(&deps.chain)),
            chain: deps.chain,
            broadcaster: deps.broadcaster,
            finality: deps.finality,
            state: Mutex::new(history),
            config: deps.config,
            time_source: Box::new(SystemTimeSource),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Share a shutdown signal with the node driver
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn leader(&self) -> &LeaderSelector<C> {
        &self.leader
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    fn node_count(&self) -> u64 {
        self.chain.node_count()
    }

    fn new_child(&self, key: AgreementKey) -> BinaryAgreementInstance {
        BinaryAgreementInstance::new(
            key,
            self.node_count(),
            self.chain.local_index(),
            self.config.max_buffered_round_messages,
        )
    }

    // === PROPOSAL ===

    async fn start_inner(
        &self,
        height: Height,
        proposals: BooleanProposalVector,
    ) -> ConsensusResult<DecisionOutcome> {
        let node_count = self.node_count();
        if height == Height::GENESIS {
            return Err(ConsensusError::InvalidArgument(
                "cannot start consensus for height 0".to_string(),
            ));
        }
        if proposals.len() as u64 != node_count {
            return Err(ConsensusError::InvalidArgument(format!(
                "proposal vector has {} entries, committee has {}",
                proposals.len(),
                node_count
            )));
        }

        let last_committed = self.chain.last_committed_height();
        if height <= last_committed {
            debug!(%height, %last_committed, "Ignoring proposal for committed height");
            return Ok(DecisionOutcome::Stale);
        }

        let fast_path = self.leader.is_fast_path_active_now(height);
        let targets: Vec<ProposerIndex> = if fast_path {
            metrics::record_fast_path_height();
            vec![self.leader.previous_winner(height)]
        } else {
            ProposerIndex::all(node_count).collect()
        };

        let steps = {
            let mut state = self.state.lock();
            let record = state.record_mut(height);
            match record.phase {
                Phase::Decided => return Ok(DecisionOutcome::Ignored),
                Phase::NotStarted => record.phase = Phase::Proposing,
                Phase::Proposing | Phase::AwaitingChildren => {}
            }

            let mut steps = Vec::with_capacity(targets.len());
            for proposer in targets {
                if self.shutdown.is_requested() {
                    return Err(ConsensusError::ShutdownRequested);
                }
                let key = AgreementKey::new(height, proposer, node_count)?;
                let Some(child) = state.child_mut(key, || self.new_child(key)) else {
                    return Err(ConsensusError::InvalidState(format!(
                        "no child slot for {key}"
                    )));
                };
                if child.has_proposed() || child.is_decided() {
                    continue;
                }
                let vote = proposals.proposal_value(proposer);
                steps.push(child.propose(vote, self.time_source.as_ref())?);
            }

            let record = state.record_mut(height);
            if record.phase == Phase::Proposing {
                record.phase = Phase::AwaitingChildren;
            }
            steps
        };

        debug!(%height, fast_path, children = steps.len(), "Started consensus proposal");
        self.apply_steps(steps).await
    }

    /// Broadcast child output and feed child decisions back to the rule.
    async fn apply_steps(&self, steps: Vec<AgreementStep>) -> ConsensusResult<DecisionOutcome> {
        let mut outcome = DecisionOutcome::Pending;
        for step in steps {
            for message in step.outgoing {
                self.broadcaster
                    .broadcast(ConsensusMessage::Round(message))
                    .await?;
            }
            if let Some(decision) = step.decision {
                let reported = self.report_inner(decision).await?;
                if matches!(reported, DecisionOutcome::Decided(_)) {
                    outcome = reported;
                }
            }
        }
        Ok(outcome)
    }

    // === DECISION ===

    async fn report_inner(&self, decision: ChildDecision) -> ConsensusResult<DecisionOutcome> {
        let node_count = self.node_count();
        let key = AgreementKey::new(decision.height, decision.proposer, node_count)?;
        let height = key.height;

        let last_committed = self.chain.last_committed_height();
        if height <= last_committed {
            debug!(%height, proposer = %key.proposer, "Child decision for committed height");
            return Ok(DecisionOutcome::Ignored);
        }

        let fast_path = self.leader.is_fast_path_active_now(height);
        let designated = self.leader.previous_winner(height);
        let priority_leader = if fast_path {
            None
        } else {
            Some(self.leader.priority_leader(height)?)
        };

        let block = {
            let mut state = self.state.lock();
            let record = state.record_mut(height);
            if record.phase == Phase::Decided {
                return Ok(DecisionOutcome::Ignored);
            }
            if fast_path && key.proposer != designated {
                warn!(
                    %height,
                    proposer = %key.proposer,
                    %designated,
                    "Child decision for non-designated proposer on fast path"
                );
                return Ok(DecisionOutcome::Ignored);
            }

            let value = decision.value;
            if record.decisions.record(decision)? == RecordOutcome::Duplicate {
                debug!(%height, proposer = %key.proposer, "Duplicate child decision");
                return Ok(DecisionOutcome::Ignored);
            }
            metrics::record_child_decision(value);

            let rule = match priority_leader {
                Some(leader) => {
                    decide_normal(&record.decisions, leader, node_count, &self.shutdown)?
                }
                None => decide_optimized(&record.decisions, designated),
            };
            let block = match rule {
                RuleOutcome::Winner(winner) => {
                    BlockDecision::new(height, winner, record.decisions.build_stats(node_count))?
                }
                RuleOutcome::DefaultBlock => BlockDecision::default_block(height),
                RuleOutcome::Pending => return Ok(DecisionOutcome::Pending),
            };
            mark_decided(record, block.clone());
            block
        };

        self.finalize_decision(&block).await?;
        Ok(DecisionOutcome::Decided(block))
    }

    /// Decide `block` unless its height already is.
    async fn decide_inner(&self, block: BlockDecision) -> ConsensusResult<DecisionOutcome> {
        {
            let mut state = self.state.lock();
            let record = state.record_mut(block.height);
            if record.phase == Phase::Decided {
                debug!(height = %block.height, "Height already decided");
                return Ok(DecisionOutcome::Ignored);
            }
            mark_decided(record, block.clone());
        }

        self.finalize_decision(&block).await?;
        Ok(DecisionOutcome::Decided(block))
    }

    /// Sign the decided block, share the signature, hand off if merged.
    async fn finalize_decision(&self, block: &BlockDecision) -> ConsensusResult<()> {
        metrics::record_block_decided(block.is_default_block());
        info!(
            height = %block.height,
            winner = %block.winner,
            stats = %block.stats,
            "Block decided"
        );

        let Some((share, outcome)) = self.finality.sign_local_share(block.height, block.winner)?
        else {
            debug!(height = %block.height, "No local share to broadcast");
            return Ok(());
        };

        self.broadcaster
            .broadcast(ConsensusMessage::BlockSignBroadcast { share })
            .await?;

        if let ShareOutcome::ThresholdMet(signature) = outcome {
            self.hand_off(signature)?;
        }
        Ok(())
    }

    fn hand_off(&self, signature: AggregateSignature) -> ConsensusResult<()> {
        let height = signature.height;
        let last_committed = self.chain.last_committed_height();
        if height <= last_committed {
            debug!(%height, %last_committed, "Merged signature for committed height");
            return Ok(());
        }

        let proposer = signature.proposer;
        self.chain
            .finalize_decided_and_signed_block(height, proposer, signature)?;
        metrics::record_block_finalized();
        info!(%height, %proposer, "Block finalized");
        Ok(())
    }

    // === ROUTING ===

    async fn route_inner(&self, envelope: MessageEnvelope) -> ConsensusResult<DecisionOutcome> {
        let MessageEnvelope { origin, message } = envelope;
        let height = message.height();

        if height == Height::GENESIS {
            return Err(ConsensusError::InvalidArgument(format!(
                "{} message for height 0",
                message.kind()
            )));
        }
        if origin == MessageOrigin::Parent {
            return Err(ConsensusError::InvalidArgument(format!(
                "{} message routed back from the coordinator",
                message.kind()
            )));
        }

        let last_committed = self.chain.last_committed_height();
        if height > last_committed.next() {
            return Err(ConsensusError::FutureHeight {
                height,
                last_committed,
            });
        }
        if height.as_u64() + self.config.max_active_consensuses < last_committed.as_u64() {
            debug!(%height, %last_committed, kind = message.kind(), "Dropping stale message");
            metrics::record_message_dropped("stale_height");
            return Ok(DecisionOutcome::Stale);
        }

        match message {
            ConsensusMessage::StartProposal { height, proposals } => {
                self.start_inner(height, proposals).await
            }
            ConsensusMessage::BlockSignBroadcast { share } => self.process_block_sign(share),
            ConsensusMessage::ChildDecided(decision) => {
                if origin != MessageOrigin::Child {
                    return Err(ConsensusError::InvalidArgument(format!(
                        "child decision for {} from {:?}",
                        decision.key(),
                        origin
                    )));
                }
                self.report_inner(decision).await
            }
            ConsensusMessage::Round(message) => self.deliver_round(message).await,
        }
    }

    async fn deliver_round(
        &self,
        message: BinaryAgreementMessage,
    ) -> ConsensusResult<DecisionOutcome> {
        let key = AgreementKey::new(message.height, message.proposer, self.node_count())?;

        if self.leader.is_fast_path_active_now(key.height)
            && key.proposer != self.leader.previous_winner(key.height)
        {
            debug!(%key, "Round message for idle child on fast path");
            metrics::record_message_dropped("fast_path_idle_child");
            return Ok(DecisionOutcome::Ignored);
        }

        let step = {
            let mut state = self.state.lock();
            let Some(child) = state.child_mut(key, || self.new_child(key)) else {
                return Err(ConsensusError::InvalidState(format!(
                    "no child slot for {key}"
                )));
            };
            child.deliver(message, self.time_source.as_ref())?
        };

        if step.is_empty() {
            return Ok(DecisionOutcome::Pending);
        }
        self.apply_steps(vec![step]).await
    }

    fn process_block_sign(&self, share: SigShare) -> ConsensusResult<DecisionOutcome> {
        let height = share.height;
        let signer = share.signer;
        let node_count = self.chain.node_count();
        if share.proposer.as_u64() > node_count {
            warn!(
                %height,
                %signer,
                proposer = %share.proposer,
                node_count,
                "Rejected block signature share for unknown proposer"
            );
            metrics::record_message_dropped("invalid_share");
            return Ok(DecisionOutcome::Ignored);
        }
        match self.finality.check_and_save_share(share) {
            Ok(ShareOutcome::ThresholdMet(signature)) => {
                self.hand_off(signature)?;
                Ok(DecisionOutcome::Pending)
            }
            Ok(ShareOutcome::Stored { have, need }) => {
                debug!(%height, %signer, have, need, "Stored block signature share");
                Ok(DecisionOutcome::Pending)
            }
            Ok(ShareOutcome::Duplicate | ShareOutcome::AlreadyMerged) => {
                Ok(DecisionOutcome::Ignored)
            }
            Err(
                err @ (FinalityError::InvalidShare { .. }
                | FinalityError::EmptyShare { .. }
                | FinalityError::ZeroSignerIndex),
            ) => {
                warn!(%height, %signer, error = %err, "Rejected block signature share");
                metrics::record_message_dropped("invalid_share");
                Ok(DecisionOutcome::Ignored)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn mark_decided(record: &mut HeightRecord, block: BlockDecision) {
    record.phase = Phase::Decided;
    record.decision = Some(block);
}

#[async_trait]
impl<C, B, F> BlockConsensusApi for BlockConsensusService<C, B, F>
where
    C: ChainAccessor,
    B: NetworkBroadcaster,
    F: FinalizationApi,
{
    async fn start_consensus_proposal(
        &self,
        height: Height,
        proposals: BooleanProposalVector,
    ) -> ConsensusResult<DecisionOutcome> {
        self.start_inner(height, proposals)
            .await
            .map_err(|e| e.into_fatal("start_consensus_proposal", height))
    }

    async fn route_and_process_message(
        &self,
        envelope: MessageEnvelope,
    ) -> ConsensusResult<DecisionOutcome> {
        let height = envelope.message.height();
        self.route_inner(envelope)
            .await
            .map_err(|e| e.into_fatal("route_and_process_message", height))
    }

    async fn report_and_maybe_decide(
        &self,
        decision: ChildDecision,
    ) -> ConsensusResult<DecisionOutcome> {
        let height = decision.height;
        self.report_inner(decision)
            .await
            .map_err(|e| e.into_fatal("report_and_maybe_decide", height))
    }

    async fn decide_block(
        &self,
        height: Height,
        proposer: ProposerIndex,
        stats: String,
    ) -> ConsensusResult<DecisionOutcome> {
        let block = AgreementKey::new(height, proposer, self.node_count())
            .map_err(ConsensusError::from)
            .and_then(|key| BlockDecision::new(key.height, key.proposer, stats))
            .map_err(|e| e.into_fatal("decide_block", height))?;
        self.decide_inner(block)
            .await
            .map_err(|e| e.into_fatal("decide_block", height))
    }

    async fn decide_default_block(&self, height: Height) -> ConsensusResult<DecisionOutcome> {
        if height == Height::GENESIS {
            return Err(ConsensusError::InvalidArgument("cannot decide height 0".to_string())
                .into_fatal("decide_default_block", height));
        }
        self.decide_inner(BlockDecision::default_block(height))
            .await
            .map_err(|e| e.into_fatal("decide_default_block", height))
    }

    fn current_round(&self, key: AgreementKey) -> u64 {
        self.state
            .lock()
            .child(key)
            .map_or(0, BinaryAgreementInstance::current_round)
    }

    fn is_decided(&self, key: AgreementKey) -> bool {
        self.state
            .lock()
            .child(key)
            .is_some_and(BinaryAgreementInstance::is_decided)
    }

    fn decision(&self, height: Height) -> Option<BlockDecision> {
        self.state
            .lock()
            .record(height)
            .and_then(|record| record.decision.clone())
    }

    fn phase(&self, height: Height) -> Phase {
        self.state
            .lock()
            .record(height)
            .map_or(Phase::NotStarted, |record| record.phase)
    }
}
