//! # Block Agreement Node Runtime
//!
//! Runs an in-process committee through the configured heights and prints
//! the agreed chain.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Install logging
//! 3. Spawn one task per committee member
//! 4. Stop after the last height or on Ctrl+C

use anyhow::{Context, Result};
use node_runtime::{init_tracing, NodeRuntime, RuntimeConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env().context("Invalid runtime configuration")?;
    init_tracing(&config.log_level)?;

    info!("===========================================");
    info!("  Block Agreement Node Runtime");
    info!("  Committee size: {}", config.node_count);
    info!("===========================================");

    let runtime = NodeRuntime::new(config);
    let shutdown = runtime.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping committee");
            shutdown.request();
        }
    });

    let report = runtime.run().await?;
    for block in report.agreed_chain() {
        info!(
            height = %block.height,
            proposer = %block.proposer,
            hash = %hex::encode(&block.hash[..8]),
            "Agreed block"
        );
    }
    info!(committed = %report.common_height(), "Node runtime stopped");
    Ok(())
}
