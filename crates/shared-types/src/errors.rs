//! # Error Types
//!
//! Errors raised while constructing shared identifiers.

use thiserror::Error;

/// Invalid identifier construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Index zero is reserved for the default block.
    #[error("Proposer index 0 is reserved for the default block")]
    ZeroProposerIndex,

    /// Index larger than the committee.
    #[error("Proposer index {index} out of range for {node_count} nodes")]
    ProposerOutOfRange { index: u64, node_count: u64 },

    /// Height zero is genesis and never runs consensus.
    #[error("Height 0 is genesis and has no agreement")]
    ZeroHeight,
}
