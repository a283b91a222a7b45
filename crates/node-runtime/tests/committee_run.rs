//! # Committee Runtime Tests
//!
//! Full runs of the in-process committee: every node on its own task,
//! messages over the hub, shares merged and blocks committed by the ledgers.

use node_runtime::{NodeRuntime, RuntimeConfig};
use shared_types::{Height, ProposerIndex};
use std::time::Duration;
use tempfile::TempDir;

/// Keep the returned directory alive for the whole run; share stores live
/// under it when the `rocksdb` feature is on.
fn config(node_count: u64, heights: u64) -> (RuntimeConfig, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = RuntimeConfig {
        node_count,
        heights,
        height_timeout: Duration::from_secs(10),
        data_dir: dir.path().to_path_buf(),
        ..RuntimeConfig::default()
    };
    (config, dir)
}

#[tokio::test]
async fn test_committee_commits_every_height() {
    let (config, _dir) = config(4, 5);
    let report = NodeRuntime::new(config).run().await.unwrap();

    assert_eq!(report.chains.len(), 4);
    assert_eq!(report.common_height(), Height(5));
    let chain = report.agreed_chain();
    for (offset, block) in chain.iter().enumerate() {
        assert_eq!(block.height, Height(offset as u64 + 1));
        assert!(!block.proposer.is_default());
    }
}

#[tokio::test]
async fn test_absent_proposer_never_wins() {
    let (base, _dir) = config(4, 4);
    let config = RuntimeConfig {
        absent_proposer: Some(2),
        ..base
    };
    let report = NodeRuntime::new(config).run().await.unwrap();

    assert_eq!(report.common_height(), Height(4));
    assert!(report
        .agreed_chain()
        .iter()
        .all(|block| block.proposer != ProposerIndex(2)));
}

#[tokio::test]
async fn test_fast_consensus_committee() {
    let (base, _dir) = config(4, 8);
    let config = RuntimeConfig {
        fast_consensus: true,
        ..base
    };
    let report = NodeRuntime::new(config).run().await.unwrap();

    let chain = report.agreed_chain();
    assert_eq!(chain.len(), 8);
    // Heights 5..=8 reuse the winner from N heights back
    for height in 5..=8usize {
        assert_eq!(chain[height - 1].proposer, chain[height - 5].proposer);
    }
}

#[tokio::test]
async fn test_single_node_committee() {
    let (config, _dir) = config(1, 3);
    let report = NodeRuntime::new(config).run().await.unwrap();
    assert_eq!(report.common_height(), Height(3));
    assert!(report
        .agreed_chain()
        .iter()
        .all(|block| block.proposer == ProposerIndex(1)));
}

#[tokio::test]
async fn test_shutdown_before_start_commits_nothing() {
    let (config, _dir) = config(4, 5);
    let runtime = NodeRuntime::new(config);
    runtime.shutdown_signal().request();

    let report = runtime.run().await.unwrap();
    assert_eq!(report.common_height(), Height::GENESIS);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let (base, _dir) = config(4, 1);
    let config = RuntimeConfig {
        absent_proposer: Some(9),
        ..base
    };
    assert!(NodeRuntime::new(config).run().await.is_err());
}
