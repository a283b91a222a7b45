//! # Hash-Based Threshold Signer
//!
//! Deterministic stand-in for a BLS threshold scheme, used by the local
//! runtime and tests. Every committee member derives all key shares from a
//! shared seed, so it offers no secrecy: it only reproduces the share,
//! verify and merge flow.
//!
//! - key share `i`: `SHA3(seed || i)`
//! - share over `m`: `SHA3(key_i || m)`
//! - aggregate over `m`: `SHA3("AGG" || seed || m)`

use crate::domain::{block_signing_message, AggregateSignature, SigShare};
use crate::error::{FinalityError, FinalityResult};
use crate::ports::outbound::ThresholdSigner;
use sha3::{Digest, Sha3_256};
use shared_types::{Hash, Height, ProposerIndex};
use std::collections::BTreeMap;

/// Threshold signer over SHA3 commitments
#[derive(Clone, Debug)]
pub struct HashThresholdSigner {
    seed: Hash,
    node_count: u64,
    local: ProposerIndex,
}

impl HashThresholdSigner {
    pub fn new(seed: Hash, node_count: u64, local: ProposerIndex) -> FinalityResult<Self> {
        if local.is_default() {
            return Err(FinalityError::ZeroSignerIndex);
        }
        Ok(Self {
            seed,
            node_count,
            local,
        })
    }

    /// Shares needed for `node_count` nodes tolerating `(N - 1) / 3` faults
    pub fn threshold_for(node_count: u64) -> usize {
        (node_count - node_count.saturating_sub(1) / 3) as usize
    }

    fn key_share(&self, signer: ProposerIndex) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.seed);
        hasher.update(signer.as_u64().to_le_bytes());
        hasher.finalize().into()
    }

    fn share_bytes(&self, signer: ProposerIndex, message: &Hash) -> Vec<u8> {
        let mut hasher = Sha3_256::new();
        hasher.update(self.key_share(signer));
        hasher.update(message);
        hasher.finalize().to_vec()
    }

    fn aggregate_bytes(&self, message: &Hash) -> Vec<u8> {
        let mut hasher = Sha3_256::new();
        hasher.update(b"AGG");
        hasher.update(self.seed);
        hasher.update(message);
        hasher.finalize().to_vec()
    }
}

impl ThresholdSigner for HashThresholdSigner {
    fn local_signer(&self) -> ProposerIndex {
        self.local
    }

    fn sign(&self, height: Height, proposer: ProposerIndex) -> FinalityResult<Option<SigShare>> {
        if self.local.checked(self.node_count).is_err() {
            return Ok(None);
        }
        let message = block_signing_message(height, proposer);
        let bytes = self.share_bytes(self.local, &message);
        SigShare::new(height, proposer, self.local, bytes).map(Some)
    }

    fn verify_share(&self, share: &SigShare) -> bool {
        if share.signer.checked(self.node_count).is_err() {
            return false;
        }
        share.bytes == self.share_bytes(share.signer, &share.signing_message())
    }

    fn try_merge(&self, shares: &[SigShare]) -> Option<AggregateSignature> {
        let first = shares.first()?;
        let (height, proposer) = (first.height, first.proposer);

        let valid: BTreeMap<ProposerIndex, &SigShare> = shares
            .iter()
            .filter(|s| s.height == height && s.proposer == proposer)
            .filter(|s| self.verify_share(s))
            .map(|s| (s.signer, s))
            .collect();

        if valid.len() < self.required_signers() {
            return None;
        }

        Some(AggregateSignature {
            height,
            proposer,
            bytes: self.aggregate_bytes(&first.signing_message()),
            signers: valid.keys().copied().collect(),
        })
    }

    fn verify(&self, signature: &AggregateSignature, message: &Hash) -> bool {
        signature.signers.len() >= self.required_signers()
            && signature.bytes == self.aggregate_bytes(message)
    }

    fn required_signers(&self) -> usize {
        Self::threshold_for(self.node_count)
    }
}
