//! # Runtime Configuration
//!
//! Committee and subsystem configuration, read from environment variables.

use qc_08_block_consensus::ConsensusConfig;
use qc_09_block_finality::{FinalityConfig, RotatingStoreConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1, got {value}")]
    ZeroValue { name: &'static str, value: u64 },

    #[error("absent proposer {proposer} is outside the committee of {node_count}")]
    AbsentProposerOutOfRange { proposer: u64, node_count: u64 },

    #[error("invalid signer seed: {0}")]
    InvalidSeed(String),
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Committee size N
    pub node_count: u64,
    /// Heights to agree on before stopping
    pub heights: u64,
    /// Enable the leader fast path
    pub fast_consensus: bool,
    /// Proposer whose candidate blocks never reach anyone
    pub absent_proposer: Option<u64>,
    /// Seed of the committee's threshold key material
    pub signer_seed: [u8; 32],
    /// Upper bound on the time one height may take
    pub height_timeout: Duration,
    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,
    /// Base directory for persisted shares (rocksdb feature)
    pub data_dir: PathBuf,
    pub consensus: ConsensusConfig,
    pub finality: FinalityConfig,
    pub store: RotatingStoreConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_count: 4,
            heights: 10,
            fast_consensus: false,
            absent_proposer: None,
            signer_seed: [0x51; 32],
            height_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            data_dir: PathBuf::from("./data"),
            consensus: ConsensusConfig::default(),
            finality: FinalityConfig::default(),
            store: RotatingStoreConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_NODE_COUNT`: Committee size (default: 4)
    /// - `QC_HEIGHTS`: Heights to run (default: 10)
    /// - `QC_FAST_CONSENSUS`: Enable the leader fast path (default: false)
    /// - `QC_ABSENT_PROPOSER`: Proposer whose blocks are never received (default: none)
    /// - `QC_SIGNER_SEED`: 32-byte hex seed of the threshold keys
    /// - `QC_HEIGHT_TIMEOUT_SECS`: Per-height timeout (default: 30)
    /// - `QC_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `QC_DATA_DIR`: Share store directory (default: ./data)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let signer_seed = match env::var("QC_SIGNER_SEED") {
            Ok(hex_seed) => parse_seed(&hex_seed)?,
            Err(_) => defaults.signer_seed,
        };

        let config = Self {
            node_count: parse_var("QC_NODE_COUNT").unwrap_or(defaults.node_count),
            heights: parse_var("QC_HEIGHTS").unwrap_or(defaults.heights),
            fast_consensus: env::var("QC_FAST_CONSENSUS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.fast_consensus),
            absent_proposer: parse_var("QC_ABSENT_PROPOSER"),
            signer_seed,
            height_timeout: parse_var("QC_HEIGHT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.height_timeout),
            log_level: env::var("QC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            data_dir: env::var("QC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::ZeroValue {
                name: "node_count",
                value: self.node_count,
            });
        }
        if self.heights == 0 {
            return Err(ConfigError::ZeroValue {
                name: "heights",
                value: self.heights,
            });
        }
        if let Some(proposer) = self.absent_proposer {
            if proposer == 0 || proposer > self.node_count {
                return Err(ConfigError::AbsentProposerOutOfRange {
                    proposer,
                    node_count: self.node_count,
                });
            }
        }
        Ok(())
    }

    /// Proposal bits every node starts a height with
    pub fn proposals(&self) -> Vec<bool> {
        (1..=self.node_count)
            .map(|proposer| Some(proposer) != self.absent_proposer)
            .collect()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn parse_seed(hex_seed: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(hex_seed).map_err(|e| ConfigError::InvalidSeed(e.to_string()))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        ConfigError::InvalidSeed(format!("expected 32 bytes, got {}", bytes.len()))
    })
}
