//! Finalization Service - share verification, persistence and merge

use crate::domain::{AggregateSignature, InsertOutcome, ShareOutcome, SigShare, SigShareDb};
use crate::error::{FinalityError, FinalityResult};
use crate::metrics;
use crate::ports::inbound::FinalizationApi;
use crate::ports::outbound::{block_signature_key, share_key, KeyValueStore, ThresholdSigner};
use crate::types::FinalityConfig;
use parking_lot::Mutex;
use shared_types::{Height, ProposerIndex};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collects signature shares for decided blocks and reports each height's
/// threshold exactly once.
pub struct FinalizationService<K: KeyValueStore, S: ThresholdSigner> {
    config: FinalityConfig,
    store: Arc<K>,
    signer: Arc<S>,
    book: Mutex<SigShareDb>,
}

impl<K: KeyValueStore, S: ThresholdSigner> FinalizationService<K, S> {
    pub fn new(config: FinalityConfig, store: Arc<K>, signer: Arc<S>) -> Self {
        let book = Mutex::new(SigShareDb::new(config.max_tracked_heights));
        Self {
            config,
            store,
            signer,
            book,
        }
    }

    pub fn required_signers(&self) -> usize {
        self.signer.required_signers()
    }

    /// Whether this node already handed `height` over.
    pub fn is_merged(&self, height: Height) -> bool {
        self.book.lock().is_merged(height)
    }

    fn persisted_aggregate(&self, height: Height) -> FinalityResult<Option<AggregateSignature>> {
        match self.store.get(&block_signature_key(height))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn persist_share(&self, share: &SigShare) -> FinalityResult<()> {
        let key = share_key(share.height, share.proposer, share.signer);
        self.store.put(&key, &bincode::serialize(share)?)
    }
}

impl<K: KeyValueStore, S: ThresholdSigner> FinalizationApi for FinalizationService<K, S> {
    fn sign_local_share(
        &self,
        height: Height,
        proposer: ProposerIndex,
    ) -> FinalityResult<Option<(SigShare, ShareOutcome)>> {
        let Some(share) = self.signer.sign(height, proposer)? else {
            debug!(%height, %proposer, "No local key share for block");
            return Ok(None);
        };

        debug!(%height, %proposer, "Signed local block share");
        let outcome = self.check_and_save_share(share.clone())?;
        Ok(Some((share, outcome)))
    }

    fn check_and_save_share(&self, share: SigShare) -> FinalityResult<ShareOutcome> {
        share.validate()?;

        // Verification is slow; never under the book lock
        if !self.signer.verify_share(&share) {
            metrics::record_share_rejected("invalid_signature");
            warn!(
                height = %share.height,
                proposer = %share.proposer,
                signer = %share.signer,
                "Rejected invalid signature share"
            );
            return Err(FinalityError::InvalidShare {
                height: share.height,
                proposer: share.proposer,
                signer: share.signer,
            });
        }

        let (height, proposer) = (share.height, share.proposer);

        // Merged before a restart: the block is already with the chain
        if !self.is_merged(height) && self.persisted_aggregate(height)?.is_some() {
            return Ok(ShareOutcome::AlreadyMerged);
        }

        if self.config.persist_shares {
            self.persist_share(&share)?;
        }

        let have = match self.book.lock().insert(share) {
            InsertOutcome::Inserted { have } => have,
            InsertOutcome::Duplicate => return Ok(ShareOutcome::Duplicate),
            InsertOutcome::AlreadyMerged => return Ok(ShareOutcome::AlreadyMerged),
        };
        metrics::record_share_accepted();

        let need = self.signer.required_signers();
        if have < need {
            debug!(%height, %proposer, have, need, "Stored signature share");
            return Ok(ShareOutcome::Stored { have, need });
        }

        let candidates = self.book.lock().candidates(height, proposer);
        let Some(aggregate) = self.signer.try_merge(&candidates) else {
            return Ok(ShareOutcome::Stored { have, need });
        };

        self.store
            .put(&block_signature_key(height), &bincode::serialize(&aggregate)?)?;

        if !self.book.lock().mark_merged(height) {
            return Ok(ShareOutcome::AlreadyMerged);
        }

        metrics::record_threshold_met();
        info!(
            %height,
            %proposer,
            signers = aggregate.signers.len(),
            "Signature threshold met"
        );
        Ok(ShareOutcome::ThresholdMet(aggregate))
    }

    fn aggregate_for(&self, height: Height) -> FinalityResult<Option<AggregateSignature>> {
        self.persisted_aggregate(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{HashThresholdSigner, RotatingMemoryStore};
    use crate::types::RotatingStoreConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SEED: [u8; 32] = [9u8; 32];

    fn service(local: u64) -> FinalizationService<RotatingMemoryStore, HashThresholdSigner> {
        let store = RotatingMemoryStore::in_memory(RotatingStoreConfig::default()).unwrap();
        let signer = HashThresholdSigner::new(SEED, 4, ProposerIndex(local)).unwrap();
        FinalizationService::new(FinalityConfig::default(), Arc::new(store), Arc::new(signer))
    }

    fn peer_share(signer: u64, height: u64, proposer: u64) -> SigShare {
        HashThresholdSigner::new(SEED, 4, ProposerIndex(signer))
            .unwrap()
            .sign(Height(height), ProposerIndex(proposer))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_threshold_reported_once() {
        let service = service(1);

        let (_, outcome) = service
            .sign_local_share(Height(3), ProposerIndex(2))
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ShareOutcome::Stored { have: 1, need: 3 });

        let outcome = service.check_and_save_share(peer_share(2, 3, 2)).unwrap();
        assert_eq!(outcome, ShareOutcome::Stored { have: 2, need: 3 });

        let outcome = service.check_and_save_share(peer_share(3, 3, 2)).unwrap();
        assert!(matches!(outcome, ShareOutcome::ThresholdMet(ref sig) if sig.height == Height(3)));

        let outcome = service.check_and_save_share(peer_share(4, 3, 2)).unwrap();
        assert_eq!(outcome, ShareOutcome::AlreadyMerged);
        assert!(service.is_merged(Height(3)));
    }

    #[test]
    fn test_duplicate_share() {
        let service = service(1);
        service.check_and_save_share(peer_share(2, 1, 1)).unwrap();
        let outcome = service.check_and_save_share(peer_share(2, 1, 1)).unwrap();
        assert_eq!(outcome, ShareOutcome::Duplicate);
    }

    #[test]
    fn test_invalid_share_rejected() {
        let service = service(1);
        let mut share = peer_share(2, 1, 1);
        share.bytes[0] ^= 0xFF;
        assert!(matches!(
            service.check_and_save_share(share),
            Err(FinalityError::InvalidShare { .. })
        ));
    }

    #[test]
    fn test_aggregate_persisted() {
        let service = service(1);
        for signer in 1..=3 {
            service.check_and_save_share(peer_share(signer, 7, 0)).unwrap();
        }
        let aggregate = service.aggregate_for(Height(7)).unwrap().unwrap();
        assert_eq!(aggregate.proposer, ProposerIndex::DEFAULT_BLOCK);
        assert_eq!(aggregate.signers.len(), 3);
        assert!(service.aggregate_for(Height(8)).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_shares_merge_once() {
        let service = Arc::new(service(1));
        let met = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (1..=4)
            .map(|signer| {
                let service = Arc::clone(&service);
                let met = Arc::clone(&met);
                std::thread::spawn(move || {
                    let outcome = service.check_and_save_share(peer_share(signer, 2, 4)).unwrap();
                    if matches!(outcome, ShareOutcome::ThresholdMet(_)) {
                        met.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(met.load(Ordering::SeqCst), 1);
    }
}
