//! # Node Runtime
//!
//! Runs a committee of block agreement nodes inside one process.
//!
//! ## Modules
//!
//! - `config` - Runtime configuration from environment variables
//! - `ledger` - Per-node committed chain (the consensus `ChainAccessor`)
//! - `network` - In-memory hub connecting the nodes
//! - `node` - Per-node driver that walks the heights
//! - `runtime` - Committee wiring and the final agreement check

pub mod config;
pub mod ledger;
pub mod network;
pub mod node;
pub mod runtime;

pub use config::{ConfigError, RuntimeConfig};
pub use ledger::InMemoryLedger;
pub use network::{connect, Delivery, HubBroadcaster};
pub use node::{ConsensusNode, NodeSchedule};
pub use runtime::{CommitteeReport, NodeRuntime, NodeStore};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `log_level` when set.
pub fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("invalid log filter: {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
