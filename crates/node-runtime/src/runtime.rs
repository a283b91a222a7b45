//! # Committee Runtime
//!
//! Wires N nodes together and runs them to completion.
//!
//! ## Per-node wiring
//!
//! ```text
//! HashThresholdSigner ─┬─→ InMemoryLedger (verifies merged signatures)
//!                      └─→ FinalizationService ←── share store
//! InMemoryLedger + HubBroadcaster + FinalizationService ──→ BlockConsensusService
//! ```

use crate::config::RuntimeConfig;
use crate::ledger::InMemoryLedger;
use crate::network::{connect, Delivery, HubBroadcaster};
use crate::node::{ConsensusNode, NodeSchedule};
use anyhow::{bail, Context, Result};
use qc_08_block_consensus::{
    BlockConsensusDependencies, BlockConsensusService, BooleanProposalVector,
};
use qc_09_block_finality::{FinalizationService, HashThresholdSigner};
use shared_types::{CommittedBlockInfo, Height, ProposerIndex, ShutdownSignal};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

#[cfg(not(feature = "rocksdb"))]
pub type NodeStore = qc_09_block_finality::RotatingMemoryStore;

#[cfg(feature = "rocksdb")]
pub type NodeStore =
    qc_09_block_finality::RotatingKvStore<qc_09_block_finality::adapters::RocksDbPieceOpener>;

/// Committed chains of every node after a run
#[derive(Debug, Clone)]
pub struct CommitteeReport {
    pub chains: BTreeMap<ProposerIndex, Vec<CommittedBlockInfo>>,
}

impl CommitteeReport {
    /// Heights committed by every node
    pub fn common_height(&self) -> Height {
        Height(
            self.chains
                .values()
                .map(|chain| chain.len() as u64)
                .min()
                .unwrap_or(0),
        )
    }

    /// The chain every node agrees on, up to `common_height`
    pub fn agreed_chain(&self) -> Vec<CommittedBlockInfo> {
        let common = self.common_height().as_u64() as usize;
        self.chains
            .values()
            .next()
            .map(|chain| chain[..common].to_vec())
            .unwrap_or_default()
    }

    /// Check that all chains commit the same block at every common height.
    pub fn check_agreement(&self) -> Result<()> {
        let common = self.common_height().as_u64() as usize;
        let Some((first_node, reference)) = self.chains.iter().next() else {
            return Ok(());
        };
        for (node, chain) in &self.chains {
            for (ours, theirs) in reference[..common].iter().zip(&chain[..common]) {
                if ours.proposer != theirs.proposer || ours.hash != theirs.hash {
                    bail!(
                        "nodes {first_node} and {node} disagree at height {}: proposer {} vs {}",
                        ours.height,
                        ours.proposer,
                        theirs.proposer
                    );
                }
            }
        }
        Ok(())
    }
}

/// In-process committee of block agreement nodes
pub struct NodeRuntime {
    config: RuntimeConfig,
    shutdown: ShutdownSignal,
}

impl NodeRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Signal that stops every node at its next check
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run all nodes through the configured heights.
    ///
    /// Fails if any node fails or if two nodes commit different blocks.
    pub async fn run(&self) -> Result<CommitteeReport> {
        self.config.validate()?;
        let node_count = self.config.node_count;
        let schedule = NodeSchedule {
            heights: self.config.heights,
            proposals: BooleanProposalVector::new(self.config.proposals())
                .context("Invalid proposal vector")?,
            height_timeout: self.config.height_timeout,
        };
        info!(
            node_count,
            heights = schedule.heights,
            fast_consensus = self.config.fast_consensus,
            absent_proposer = ?self.config.absent_proposer,
            "Starting committee"
        );

        let (broadcasters, inboxes) = connect(node_count);
        let finished = Arc::new(watch::channel(0u64).0);

        let mut tasks = JoinSet::new();
        for ((local, broadcaster), inbox) in ProposerIndex::all(node_count)
            .zip(broadcasters)
            .zip(inboxes)
        {
            let node = self.build_node(local, broadcaster, inbox, schedule.clone(), &finished)?;
            tasks.spawn(async move { (local, node.run().await) });
        }

        let mut chains = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (local, result) = joined.context("Node task panicked")?;
            match result {
                Ok(chain) => {
                    chains.insert(local, chain);
                }
                Err(err) => {
                    error!(node = %local, error = %err, "Node failed, stopping committee");
                    self.shutdown.request();
                    return Err(err);
                }
            }
        }

        let report = CommitteeReport { chains };
        report.check_agreement()?;
        info!(committed = %report.common_height(), "Committee finished");
        Ok(report)
    }

    fn build_node(
        &self,
        local: ProposerIndex,
        broadcaster: HubBroadcaster,
        inbox: UnboundedReceiver<Delivery>,
        schedule: NodeSchedule,
        finished: &Arc<watch::Sender<u64>>,
    ) -> Result<ConsensusNode<NodeStore>> {
        let config = &self.config;
        let signer = Arc::new(
            HashThresholdSigner::new(config.signer_seed, config.node_count, local)
                .with_context(|| format!("Failed to create signer for node {local}"))?,
        );
        let ledger = Arc::new(InMemoryLedger::new(
            config.node_count,
            local,
            config.fast_consensus,
            Arc::clone(&signer),
        ));
        let store = open_store(config, local)?;
        let finality = Arc::new(FinalizationService::new(
            config.finality.clone(),
            Arc::new(store),
            signer,
        ));
        let service = BlockConsensusService::new(BlockConsensusDependencies {
            chain: Arc::clone(&ledger),
            broadcaster: Arc::new(broadcaster),
            finality,
            config: config.consensus.clone(),
        })
        .with_shutdown(self.shutdown.clone());

        Ok(ConsensusNode::new(
            ledger,
            service,
            inbox,
            schedule,
            self.shutdown.clone(),
            Arc::clone(finished),
        ))
    }
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(config: &RuntimeConfig, local: ProposerIndex) -> Result<NodeStore> {
    NodeStore::in_memory(config.store.clone())
        .with_context(|| format!("Failed to open share store for node {local}"))
}

#[cfg(feature = "rocksdb")]
fn open_store(config: &RuntimeConfig, local: ProposerIndex) -> Result<NodeStore> {
    let opener = qc_09_block_finality::adapters::RocksDbPieceOpener::new(
        config.data_dir.join(format!("node-{local}")),
        "sig-shares",
    );
    NodeStore::open(opener, config.store.clone())
        .with_context(|| format!("Failed to open share store for node {local}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, proposer: u64, hash: u8) -> CommittedBlockInfo {
        CommittedBlockInfo {
            height: Height(height),
            proposer: ProposerIndex(proposer),
            hash: [hash; 32],
            timestamp_s: 0,
        }
    }

    #[test]
    fn test_report_common_prefix() {
        let mut chains = BTreeMap::new();
        chains.insert(ProposerIndex(1), vec![block(1, 2, 1), block(2, 3, 2)]);
        chains.insert(ProposerIndex(2), vec![block(1, 2, 1)]);
        let report = CommitteeReport { chains };

        assert_eq!(report.common_height(), Height(1));
        assert_eq!(report.agreed_chain(), vec![block(1, 2, 1)]);
        assert!(report.check_agreement().is_ok());
    }

    #[test]
    fn test_report_detects_disagreement() {
        let mut chains = BTreeMap::new();
        chains.insert(ProposerIndex(1), vec![block(1, 2, 1)]);
        chains.insert(ProposerIndex(2), vec![block(1, 3, 1)]);
        let report = CommitteeReport { chains };

        assert!(report.check_agreement().is_err());
    }
}
