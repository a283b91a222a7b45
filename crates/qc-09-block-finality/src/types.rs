use serde::{Deserialize, Serialize};

/// Default number of heights whose shares are kept in memory
pub const DEFAULT_MAX_TRACKED_HEIGHTS: usize = 1024;

/// Finality configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalityConfig {
    /// Heights kept in the in-memory share book before the oldest are pruned
    pub max_tracked_heights: usize,
    /// Persist every accepted share, not just merged signatures
    pub persist_shares: bool,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            max_tracked_heights: DEFAULT_MAX_TRACKED_HEIGHTS,
            persist_shares: true,
        }
    }
}

/// Rotating key/value store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatingStoreConfig {
    /// Number of live pieces; the oldest is dropped on rotation
    pub pieces: usize,
    /// Rotate once the active piece grows past this many bytes
    pub max_piece_size: u64,
}

impl Default for RotatingStoreConfig {
    fn default() -> Self {
        Self {
            pieces: 4,
            max_piece_size: 64 * 1024 * 1024, // 64MB
        }
    }
}
