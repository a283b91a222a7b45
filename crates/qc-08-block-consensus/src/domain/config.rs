use serde::{Deserialize, Serialize};

/// Heights below `last_committed - MAX_ACTIVE_CONSENSUSES` are stale
pub const MAX_ACTIVE_CONSENSUSES: u64 = 5;

/// Heights kept in the decision history
pub const MAX_CONSENSUS_HISTORY: usize = 1024;

/// Round messages buffered per child agreement
pub const MAX_BUFFERED_ROUND_MESSAGES: usize = 1024;

/// Block consensus configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// How far behind the last committed height messages are still routed
    pub max_active_consensuses: u64,
    /// LRU capacity of the per-height history and per-proposer child caches
    pub max_consensus_history: usize,
    /// Future-round messages held by one child agreement
    pub max_buffered_round_messages: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_active_consensuses: MAX_ACTIVE_CONSENSUSES,
            max_consensus_history: MAX_CONSENSUS_HISTORY,
            max_buffered_round_messages: MAX_BUFFERED_ROUND_MESSAGES,
        }
    }
}
