//! Error types for the Block Consensus subsystem

use qc_09_block_finality::FinalityError;
use shared_types::{Height, IdError, ProposerIndex};

/// Block consensus error types
///
/// Stale and duplicate inputs are not errors; they surface as
/// [`DecisionOutcome`](super::DecisionOutcome) values.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Malformed call or message, rejected before any state change
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal consistency check failed
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A child reported both values for one agreement
    #[error(
        "Conflicting decision for {height}:{proposer}: recorded {recorded}, reported {reported}"
    )]
    ConflictingDecision {
        height: Height,
        proposer: ProposerIndex,
        recorded: bool,
        reported: bool,
    },

    /// Message for a height past the next one to decide
    #[error("Future height {height}, last committed is {last_committed}")]
    FutureHeight { height: Height, last_committed: Height },

    /// Committed block needed for leader selection is not available
    #[error("Missing committed block {0}")]
    MissingBlock(Height),

    /// Exit requested; never wrapped
    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Finality error: {0}")]
    Finality(#[from] FinalityError),

    /// Network broadcast failed
    #[error("Broadcast error: {0}")]
    Broadcast(String),

    /// Chain rejected a finalized block
    #[error("Chain error: {0}")]
    Chain(String),

    /// Unrecoverable failure while processing, with context
    #[error("Fatal error in {operation} at height {height}: {source}")]
    Fatal {
        operation: &'static str,
        height: Height,
        #[source]
        source: Box<ConsensusError>,
    },
}

impl ConsensusError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ConsensusError::ShutdownRequested)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsensusError::Fatal { .. })
    }

    /// Wrap with the failing operation and height.
    ///
    /// Shutdown passes through untouched and fatal errors are not wrapped twice.
    pub fn into_fatal(self, operation: &'static str, height: Height) -> Self {
        match self {
            ConsensusError::ShutdownRequested | ConsensusError::Fatal { .. } => self,
            other => ConsensusError::Fatal {
                operation,
                height,
                source: Box::new(other),
            },
        }
    }

    /// Innermost error below any fatal wrappers.
    pub fn root(&self) -> &ConsensusError {
        match self {
            ConsensusError::Fatal { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<IdError> for ConsensusError {
    fn from(err: IdError) -> Self {
        ConsensusError::InvalidArgument(err.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
