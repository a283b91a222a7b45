//! Error types for the Finality subsystem

use shared_types::{Height, ProposerIndex};
use thiserror::Error;

/// Finality subsystem errors
#[derive(Debug, Error)]
pub enum FinalityError {
    /// Signer index zero is reserved
    #[error("Zero signer index in signature share")]
    ZeroSignerIndex,

    /// Share carries no signature bytes
    #[error("Empty signature share for block {height}")]
    EmptyShare { height: Height },

    /// Share failed verification against the signer's public share
    #[error("Invalid signature share from signer {signer} for block {height} proposer {proposer}")]
    InvalidShare {
        height: Height,
        proposer: ProposerIndex,
        signer: ProposerIndex,
    },

    /// Key/value store failure
    #[error("Storage error: {reason}")]
    StorageError { reason: String },

    /// Persisted record could not be encoded or decoded
    #[error("Encoding error: {reason}")]
    EncodingError { reason: String },
}

impl From<bincode::Error> for FinalityError {
    fn from(err: bincode::Error) -> Self {
        FinalityError::EncodingError {
            reason: err.to_string(),
        }
    }
}

/// Result type for finality operations
pub type FinalityResult<T> = Result<T, FinalityError>;
