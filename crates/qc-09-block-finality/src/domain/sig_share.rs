//! # Signature Shares
//!
//! A node signs `(height, proposer)` once a height is decided. Shares from
//! enough distinct signers merge into one aggregate signature that the chain
//! accepts as proof the block was agreed.

use crate::error::{FinalityError, FinalityResult};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use shared_types::{Hash, Height, ProposerIndex};

/// Domain tag mixed into every signed block message.
const BLOCK_SIGN_DOMAIN: &[u8] = b"QC-BLOCK-SIGN";

/// The message every node signs for a decided block.
///
/// The default block is signed like any other, with proposer `0`.
pub fn block_signing_message(height: Height, proposer: ProposerIndex) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(BLOCK_SIGN_DOMAIN);
    hasher.update(height.as_u64().to_le_bytes());
    hasher.update(proposer.as_u64().to_le_bytes());
    hasher.finalize().into()
}

/// One node's threshold signature share over a decided block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigShare {
    pub height: Height,
    /// Winning proposer (or `DEFAULT_BLOCK`)
    pub proposer: ProposerIndex,
    /// Node that produced the share (1..=N)
    pub signer: ProposerIndex,
    pub bytes: Vec<u8>,
}

impl SigShare {
    pub fn new(
        height: Height,
        proposer: ProposerIndex,
        signer: ProposerIndex,
        bytes: Vec<u8>,
    ) -> FinalityResult<Self> {
        let share = Self {
            height,
            proposer,
            signer,
            bytes,
        };
        share.validate()?;
        Ok(share)
    }

    /// Structural checks that do not need key material.
    pub fn validate(&self) -> FinalityResult<()> {
        if self.signer.is_default() {
            return Err(FinalityError::ZeroSignerIndex);
        }
        if self.bytes.is_empty() {
            return Err(FinalityError::EmptyShare {
                height: self.height,
            });
        }
        Ok(())
    }

    pub fn signing_message(&self) -> Hash {
        block_signing_message(self.height, self.proposer)
    }
}

/// Merged threshold signature for a decided block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSignature {
    pub height: Height,
    pub proposer: ProposerIndex,
    pub bytes: Vec<u8>,
    /// Signers whose shares went into the merge, ascending
    pub signers: Vec<ProposerIndex>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_message_binds_height_and_proposer() {
        let a = block_signing_message(Height(5), ProposerIndex(2));
        let b = block_signing_message(Height(5), ProposerIndex(3));
        let c = block_signing_message(Height(6), ProposerIndex(2));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, block_signing_message(Height(5), ProposerIndex(2)));
    }

    #[test]
    fn test_share_rejects_zero_signer() {
        let result = SigShare::new(Height(1), ProposerIndex(1), ProposerIndex(0), vec![1]);
        assert!(matches!(result, Err(FinalityError::ZeroSignerIndex)));
    }

    #[test]
    fn test_share_rejects_empty_bytes() {
        let result = SigShare::new(Height(1), ProposerIndex(1), ProposerIndex(2), vec![]);
        assert!(matches!(result, Err(FinalityError::EmptyShare { .. })));
    }

    #[test]
    fn test_default_block_share_is_valid() {
        let share = SigShare::new(
            Height(3),
            ProposerIndex::DEFAULT_BLOCK,
            ProposerIndex(4),
            vec![0xAA],
        )
        .unwrap();
        assert_eq!(
            share.signing_message(),
            block_signing_message(Height(3), ProposerIndex::DEFAULT_BLOCK)
        );
    }
}
