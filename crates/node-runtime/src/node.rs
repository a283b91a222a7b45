//! # Consensus Node
//!
//! Drives one committee member through a run of heights.
//!
//! ## Loop per height
//!
//! 1. Replay buffered messages that became routable
//! 2. Start the height's agreements with the local proposal bits
//! 3. Route inbound messages until the ledger commits the height
//!
//! Peers may already be one height ahead. Their messages would be fatal
//! future-height input for the coordinator, so they wait in `pending` until
//! the ledger catches up.

use crate::ledger::InMemoryLedger;
use crate::network::{Delivery, HubBroadcaster};
use anyhow::{anyhow, bail, Result};
use qc_08_block_consensus::{
    BlockConsensusApi, BlockConsensusService, BooleanProposalVector, ChainAccessor,
    DecisionOutcome, MessageEnvelope,
};
use qc_09_block_finality::{FinalizationService, HashThresholdSigner, KeyValueStore};
use shared_types::{CommittedBlockInfo, Height, ProposerIndex, ShutdownSignal};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tracing::{debug, info};

/// How often an idle node rechecks the shutdown signal
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

pub type NodeLedger = InMemoryLedger<HashThresholdSigner>;
pub type NodeFinality<K> = FinalizationService<K, HashThresholdSigner>;
pub type NodeService<K> = BlockConsensusService<NodeLedger, HubBroadcaster, NodeFinality<K>>;

/// Run parameters shared by every node
#[derive(Clone, Debug)]
pub struct NodeSchedule {
    pub heights: u64,
    pub proposals: BooleanProposalVector,
    pub height_timeout: Duration,
}

/// One committee member
pub struct ConsensusNode<K: KeyValueStore + 'static> {
    local: ProposerIndex,
    ledger: Arc<NodeLedger>,
    service: NodeService<K>,
    inbox: UnboundedReceiver<Delivery>,
    pending: BTreeMap<Height, Vec<Delivery>>,
    schedule: NodeSchedule,
    shutdown: ShutdownSignal,
    finished: Arc<watch::Sender<u64>>,
}

impl<K: KeyValueStore + 'static> ConsensusNode<K> {
    pub fn new(
        ledger: Arc<NodeLedger>,
        service: NodeService<K>,
        inbox: UnboundedReceiver<Delivery>,
        schedule: NodeSchedule,
        shutdown: ShutdownSignal,
        finished: Arc<watch::Sender<u64>>,
    ) -> Self {
        Self {
            local: ledger.local_index(),
            ledger,
            service,
            inbox,
            pending: BTreeMap::new(),
            schedule,
            shutdown,
            finished,
        }
    }

    /// Run every scheduled height, then keep serving peers until the whole
    /// committee is done. Returns the committed chain.
    pub async fn run(mut self) -> Result<Vec<CommittedBlockInfo>> {
        for height in (1..=self.schedule.heights).map(Height) {
            if self.shutdown.is_requested() {
                info!(node = %self.local, %height, "Stopping before height");
                break;
            }

            self.replay_pending().await?;

            debug!(node = %self.local, %height, "Starting height");
            match self
                .service
                .start_consensus_proposal(height, self.schedule.proposals.clone())
                .await
            {
                Ok(outcome) => log_outcome(self.local, &outcome),
                Err(err) if err.is_shutdown() => break,
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("node {} failed to start height {height}", self.local)))
                }
            }

            tokio::time::timeout(self.schedule.height_timeout, self.drive_until_committed(height))
                .await
                .map_err(|_| anyhow!("node {} stalled at height {height}", self.local))??;
        }

        self.finished.send_modify(|done| *done += 1);
        self.serve_until_committee_finished().await?;
        Ok(self.ledger.blocks())
    }

    async fn drive_until_committed(&mut self, height: Height) -> Result<()> {
        let mut commits = self.ledger.subscribe_commits();
        loop {
            if *commits.borrow_and_update() >= height || self.shutdown.is_requested() {
                return Ok(());
            }
            tokio::select! {
                delivery = self.inbox.recv() => match delivery {
                    Some(delivery) => self.handle(delivery).await?,
                    None => bail!("node {} inbox closed at height {height}", self.local),
                },
                _ = tokio::time::sleep(SHUTDOWN_POLL) => {}
            }
        }
    }

    async fn serve_until_committee_finished(&mut self) -> Result<()> {
        let node_count = self.ledger.node_count();
        let mut finished = self.finished.subscribe();
        loop {
            if *finished.borrow_and_update() >= node_count {
                return Ok(());
            }
            tokio::select! {
                delivery = self.inbox.recv() => match delivery {
                    Some(delivery) => self.handle(delivery).await?,
                    None => return Ok(()),
                },
                changed = finished.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn replay_pending(&mut self) -> Result<()> {
        let routable = self.ledger.last_committed_height().next();
        let ready: Vec<Height> = self.pending.range(..=routable).map(|(h, _)| *h).collect();
        for height in ready {
            for delivery in self.pending.remove(&height).unwrap_or_default() {
                self.handle(delivery).await?;
            }
        }
        Ok(())
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<()> {
        let height = delivery.message.height();
        if height > self.ledger.last_committed_height().next() {
            debug!(node = %self.local, %height, kind = delivery.message.kind(), "Holding message for later height");
            self.pending.entry(height).or_default().push(delivery);
            return Ok(());
        }

        let from = delivery.from;
        match self
            .service
            .route_and_process_message(MessageEnvelope::network(delivery.message))
            .await
        {
            Ok(outcome) => {
                log_outcome(self.local, &outcome);
                Ok(())
            }
            Err(err) if err.is_shutdown() => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("node {} failed on message from node {from}", self.local))),
        }
    }
}

fn log_outcome(local: ProposerIndex, outcome: &DecisionOutcome) {
    if let DecisionOutcome::Decided(decision) = outcome {
        debug!(
            node = %local,
            height = %decision.height,
            winner = %decision.winner,
            "Node decided height"
        );
    }
}
