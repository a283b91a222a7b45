//! # Committee Agreement Tests
//!
//! Runs N coordinators in one process. Every broadcast message is delivered
//! to every other coordinator until the network is quiet, then the committed
//! chains are compared.
//!
//! ## Properties
//!
//! - Every node commits every height
//! - Every node commits the same proposer for a height
//! - Fast-path heights commit the previous winner's block

use parking_lot::RwLock;
use qc_08_block_consensus::{
    BlockConsensusApi, BlockConsensusDependencies, BlockConsensusService, BooleanProposalVector,
    ChainAccessor, ConsensusConfig, ConsensusResult, InMemoryBroadcaster, MessageEnvelope,
};
use qc_09_block_finality::{
    AggregateSignature, FinalityConfig, FinalizationService, HashThresholdSigner,
    RotatingMemoryStore, RotatingStoreConfig,
};
use shared_types::{CommittedBlockInfo, Height, ProposerIndex};
use std::collections::BTreeMap;
use std::sync::Arc;

const SEED: [u8; 32] = [3u8; 32];

struct LocalChain {
    node_count: u64,
    local: ProposerIndex,
    fast: bool,
    blocks: RwLock<BTreeMap<u64, CommittedBlockInfo>>,
}

impl ChainAccessor for LocalChain {
    fn last_committed_height(&self) -> Height {
        Height(self.blocks.read().keys().next_back().copied().unwrap_or(0))
    }

    fn last_committed_timestamp_s(&self) -> u64 {
        0
    }

    fn block_at(&self, height: Height) -> Option<CommittedBlockInfo> {
        self.blocks.read().get(&height.as_u64()).cloned()
    }

    fn node_count(&self) -> u64 {
        self.node_count
    }

    fn local_index(&self) -> ProposerIndex {
        self.local
    }

    fn is_fast_consensus_enabled(&self, _timestamp_s: u64) -> bool {
        self.fast
    }

    fn finalize_decided_and_signed_block(
        &self,
        height: Height,
        proposer: ProposerIndex,
        _signature: AggregateSignature,
    ) -> ConsensusResult<()> {
        self.blocks.write().insert(
            height.as_u64(),
            CommittedBlockInfo {
                height,
                proposer,
                hash: [height.as_u64() as u8 ^ proposer.as_u64() as u8; 32],
                timestamp_s: 0,
            },
        );
        Ok(())
    }
}

type Finality = FinalizationService<RotatingMemoryStore, HashThresholdSigner>;

struct Node {
    chain: Arc<LocalChain>,
    broadcaster: Arc<InMemoryBroadcaster>,
    service: BlockConsensusService<LocalChain, InMemoryBroadcaster, Finality>,
}

fn committee(node_count: u64, fast: bool) -> Vec<Node> {
    (1..=node_count)
        .map(|i| {
            let chain = Arc::new(LocalChain {
                node_count,
                local: ProposerIndex(i),
                fast,
                blocks: RwLock::new(BTreeMap::new()),
            });
            let broadcaster = Arc::new(InMemoryBroadcaster::new());
            let signer = HashThresholdSigner::new(SEED, node_count, ProposerIndex(i)).unwrap();
            let store = RotatingMemoryStore::in_memory(RotatingStoreConfig::default()).unwrap();
            let finality = Arc::new(FinalizationService::new(
                FinalityConfig::default(),
                Arc::new(store),
                Arc::new(signer),
            ));
            let service = BlockConsensusService::new(BlockConsensusDependencies {
                chain: Arc::clone(&chain),
                broadcaster: Arc::clone(&broadcaster),
                finality,
                config: ConsensusConfig::default(),
            });
            Node {
                chain,
                broadcaster,
                service,
            }
        })
        .collect()
}

/// Deliver every pending broadcast to every other node until quiet.
async fn pump(nodes: &[Node]) {
    let mut rounds = 0;
    loop {
        rounds += 1;
        assert!(rounds < 10_000, "network did not go quiet");

        let mut delivered = false;
        for (i, node) in nodes.iter().enumerate() {
            for message in node.broadcaster.drain() {
                delivered = true;
                for (j, peer) in nodes.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    peer.service
                        .route_and_process_message(MessageEnvelope::network(message.clone()))
                        .await
                        .unwrap();
                }
            }
        }
        if !delivered {
            break;
        }
    }
}

async fn run_height(nodes: &[Node], height: u64, proposals: &BooleanProposalVector) {
    for node in nodes {
        node.service
            .start_consensus_proposal(Height(height), proposals.clone())
            .await
            .unwrap();
    }
    pump(nodes).await;
}

fn committed_proposer(node: &Node, height: u64) -> ProposerIndex {
    node.chain
        .block_at(Height(height))
        .unwrap_or_else(|| panic!("height {height} not committed"))
        .proposer
}

fn assert_same_chain(nodes: &[Node], heights: u64) {
    for height in 1..=heights {
        let expected = committed_proposer(&nodes[0], height);
        for node in &nodes[1..] {
            assert_eq!(committed_proposer(node, height), expected, "height {height}");
        }
    }
}

#[tokio::test]
async fn test_all_nodes_commit_identical_blocks() {
    let nodes = committee(4, false);
    let proposals = BooleanProposalVector::all_present(4).unwrap();

    for height in 1..=3 {
        run_height(&nodes, height, &proposals).await;
    }

    assert_same_chain(&nodes, 3);
    // Height 1 leader seed is 1, so proposer 2 leads and every block is present
    assert_eq!(committed_proposer(&nodes[0], 1), ProposerIndex(2));
}

#[tokio::test]
async fn test_missing_block_skipped_in_priority_order() {
    let nodes = committee(4, false);
    // Nobody has proposer 2's block
    let proposals = BooleanProposalVector::new(vec![true, false, true, true]).unwrap();

    run_height(&nodes, 1, &proposals).await;

    assert_same_chain(&nodes, 1);
    assert_eq!(committed_proposer(&nodes[0], 1), ProposerIndex(3));
}

#[tokio::test]
async fn test_no_blocks_commits_default_block() {
    let nodes = committee(4, false);
    let proposals = BooleanProposalVector::new(vec![false; 4]).unwrap();

    run_height(&nodes, 1, &proposals).await;

    assert_same_chain(&nodes, 1);
    assert_eq!(committed_proposer(&nodes[0], 1), ProposerIndex::DEFAULT_BLOCK);
}

#[tokio::test]
async fn test_fast_path_heights_follow_previous_winner() {
    let nodes = committee(4, true);
    let proposals = BooleanProposalVector::all_present(4).unwrap();

    for height in 1..=6 {
        run_height(&nodes, height, &proposals).await;
    }

    assert_same_chain(&nodes, 6);
    for height in 5..=6 {
        assert!(nodes[0].service.leader().is_fast_path_active_now(Height(height)));
        assert_eq!(
            committed_proposer(&nodes[0], height),
            committed_proposer(&nodes[0], height - 4)
        );
    }
}

#[tokio::test]
async fn test_single_node_committee() {
    let nodes = committee(1, false);
    let proposals = BooleanProposalVector::new(vec![true]).unwrap();

    for height in 1..=3 {
        run_height(&nodes, height, &proposals).await;
    }
    assert_eq!(nodes[0].chain.last_committed_height(), Height(3));
}
