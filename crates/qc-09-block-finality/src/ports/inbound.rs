//! Driving Ports (API - Inbound)

use crate::domain::{AggregateSignature, ShareOutcome, SigShare};
use crate::error::FinalityResult;
use shared_types::{Height, ProposerIndex};

/// Finalization API used by the block consensus coordinator.
pub trait FinalizationApi: Send + Sync {
    /// Sign the decided block with the local key share.
    ///
    /// The share is also recorded locally, so a single-node committee reaches
    /// the threshold on its own share. `None` when the local node holds no
    /// key share for this block.
    fn sign_local_share(
        &self,
        height: Height,
        proposer: ProposerIndex,
    ) -> FinalityResult<Option<(SigShare, ShareOutcome)>>;

    /// Verify, persist and count a share.
    ///
    /// Returns [`ShareOutcome::ThresholdMet`] at most once per height.
    fn check_and_save_share(&self, share: SigShare) -> FinalityResult<ShareOutcome>;

    /// Merged signature for a height, if one was produced or persisted
    fn aggregate_for(&self, height: Height) -> FinalityResult<Option<AggregateSignature>>;
}
