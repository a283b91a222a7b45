//! Driven Ports (SPI - Outbound Dependencies)

use crate::domain::{AggregateSignature, SigShare};
use crate::error::FinalityResult;
use shared_types::{Hash, Height, ProposerIndex};

/// Threshold signature scheme used to finalize decided blocks.
///
/// The node holds one private key share; any `required_signers()` distinct
/// valid shares over the same message merge into one aggregate signature.
pub trait ThresholdSigner: Send + Sync {
    /// Index of the local key share
    fn local_signer(&self) -> ProposerIndex;

    /// Sign the decided block with the local key share.
    ///
    /// `None` when the local node holds no valid share for this block.
    fn sign(&self, height: Height, proposer: ProposerIndex) -> FinalityResult<Option<SigShare>>;

    /// Check one share against the signer's public share
    fn verify_share(&self, share: &SigShare) -> bool;

    /// Merge shares over the same block.
    ///
    /// Returns `None` when fewer than `required_signers()` valid distinct
    /// shares are present.
    fn try_merge(&self, shares: &[SigShare]) -> Option<AggregateSignature>;

    /// Check a merged signature over `message` against the group public key
    fn verify(&self, signature: &AggregateSignature, message: &Hash) -> bool;

    /// Shares needed for a merge
    fn required_signers(&self) -> usize;
}

/// Durable key/value storage for shares and merged signatures.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> FinalityResult<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> FinalityResult<()>;
}

/// One size-bounded piece of a rotating store.
pub trait KvPiece: Send + Sync {
    fn get(&self, key: &[u8]) -> FinalityResult<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> FinalityResult<()>;

    /// Approximate bytes held by the piece
    fn approximate_size(&self) -> FinalityResult<u64>;
}

/// Opens numbered pieces for a rotating store.
pub trait PieceOpener: Send + Sync {
    type Piece: KvPiece;

    /// Open (creating if absent) the piece with this index
    fn open(&self, index: u64) -> FinalityResult<Self::Piece>;

    /// Highest piece index already present, if any
    fn highest_existing_index(&self) -> FinalityResult<Option<u64>>;

    /// Drop a piece that rotated out. Default: nothing to clean up.
    fn discard(&self, _index: u64) -> FinalityResult<()> {
        Ok(())
    }
}

/// Record key for one stored share
pub fn share_key(height: Height, proposer: ProposerIndex, signer: ProposerIndex) -> Vec<u8> {
    format!("SIG_SHARE:{height}:{proposer}:{signer}").into_bytes()
}

/// Record key for the merged signature of a height
pub fn block_signature_key(height: Height) -> Vec<u8> {
    format!("BLOCK_SIG:{height}").into_bytes()
}
