//! The Chain Validator (§4.E): walks the stored chain verifying
//! signatures and chained-mode linkage, optionally repairing from
//! peers as it goes.

use std::sync::Arc;

use drand_core::Scheme;
use drand_net::{client, Metadata, PeerPool};
use drand_store::{ChainStore, StoreError};
use tokio::sync::mpsc;

use crate::error::SyncError;

#[derive(Clone, Copy, Debug)]
pub struct ValidationProgress {
    pub current: u64,
    pub target: u64,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub invalid_rounds: Vec<u64>,
    pub target: u64,
}

/// Walks `store` from round 1 up to `up_to` (or its last round, if
/// `up_to` is `None` or past it), verifying each beacon's signature and
/// — for chained schemes — the previous-round linkage. A missing or
/// invalid round invalidates verification of its successor as well
/// (§4.E). In `dry_run` mode the final progress message reports
/// `{current: 0, target: invalid_count}` instead of the round-by-round
/// walk's own `{current, target}` pairs, per §4.E's dry-run summary.
#[allow(clippy::too_many_arguments)]
pub async fn validate_chain(
    store: Arc<dyn ChainStore>,
    scheme: &dyn Scheme,
    public_key: &[u8],
    chained: bool,
    repair: bool,
    dry_run: bool,
    repair_peers: &[String],
    pool: Option<&PeerPool>,
    beacon_id: &str,
    chain_hash: &[u8],
    up_to: Option<u64>,
    progress_tx: mpsc::Sender<ValidationProgress>,
) -> Result<ValidationReport, SyncError> {
    let last_round = match store.last().await {
        Ok(beacon) => beacon.round,
        Err(StoreError::NoBeaconStored) => return Ok(ValidationReport::default()),
        Err(err) => return Err(err.into()),
    };
    let target = up_to.map(|bound| bound.min(last_round)).unwrap_or(last_round);

    let mut report = ValidationReport { invalid_rounds: Vec::new(), target };
    let mut predecessor_invalid = false;

    for round in 1..=target {
        let valid = match store.get(round).await {
            Ok(beacon) => {
                let digest = scheme.digest(round, &beacon.previous_signature);
                let sig_ok = scheme.verify(public_key, &digest, &beacon.signature).unwrap_or(false);
                let linkage_ok = if chained {
                    match store.get(round - 1).await {
                        Ok(prev) => prev.signature == beacon.previous_signature,
                        Err(_) => false,
                    }
                } else {
                    true
                };
                sig_ok && linkage_ok && !predecessor_invalid
            }
            Err(StoreError::NoBeaconStored) => false,
            Err(err) => return Err(err.into()),
        };

        if !valid {
            report.invalid_rounds.push(round);
            predecessor_invalid = chained;

            if repair {
                repair_round(&store, round, repair_peers, pool, beacon_id, chain_hash).await;
                predecessor_invalid = false;
            }
        } else {
            predecessor_invalid = false;
        }

        let _ = progress_tx
            .send(ValidationProgress { current: round, target })
            .await;
    }

    if dry_run {
        let _ = progress_tx
            .send(ValidationProgress {
                current: 0,
                target: report.invalid_rounds.len() as u64,
            })
            .await;
    }

    Ok(report)
}

async fn repair_round(
    store: &Arc<dyn ChainStore>,
    round: u64,
    peers: &[String],
    pool: Option<&PeerPool>,
    beacon_id: &str,
    chain_hash: &[u8],
) {
    let Some(pool) = pool else { return };
    for peer in peers {
        let metadata = Metadata::new(beacon_id, chain_hash.to_vec());
        let Ok(mut stream) = client::pull_chain(pool, peer, metadata, round).await else {
            continue;
        };
        if let Ok(Some(packet)) = stream.message().await {
            if packet.round == round {
                let _ = store.del(round).await;
                let beacon = drand_core::Beacon {
                    round: packet.round,
                    signature: packet.signature,
                    previous_signature: packet.previous_signature,
                };
                if store.put(beacon, false).await.is_ok() {
                    tracing::info!(round, peer, "repaired beacon from peer");
                    return;
                }
            }
        }
    }
    tracing::warn!(round, "could not repair beacon from any peer");
}

#[cfg(test)]
mod tests {
    use super::*;
    use drand_core::{scheme::UnchainedScheme, Beacon};
    use drand_store::MemStore;

    #[tokio::test]
    async fn dry_run_reports_zero_invalid_when_empty() {
        let store: Arc<dyn ChainStore> = Arc::new(MemStore::new(10));
        let scheme = UnchainedScheme;
        let (tx, _rx) = mpsc::channel(8);
        let report = validate_chain(
            store, &scheme, &[], false, false, false, &[], None, "default", &[], None, tx,
        )
        .await
        .unwrap();
        assert_eq!(report.invalid_rounds.len(), 0);
        assert_eq!(report.target, 0);
    }

    #[tokio::test]
    async fn flags_a_round_with_a_tampered_signature() {
        let store: Arc<dyn ChainStore> = Arc::new(MemStore::new(10));
        store
            .put(Beacon { round: 1, signature: vec![9; 96], previous_signature: vec![] }, false)
            .await
            .unwrap();
        let scheme = UnchainedScheme;
        let (tx, _rx) = mpsc::channel(8);
        let report = validate_chain(
            store, &scheme, &[0; 192], false, false, false, &[], None, "default", &[], None, tx,
        )
        .await
        .unwrap();
        assert_eq!(report.invalid_rounds, vec![1]);
    }

    #[tokio::test]
    async fn dry_run_final_message_reports_invalid_count_not_round() {
        let store: Arc<dyn ChainStore> = Arc::new(MemStore::new(10));
        store
            .put(Beacon { round: 1, signature: vec![9; 96], previous_signature: vec![] }, false)
            .await
            .unwrap();
        let scheme = UnchainedScheme;
        let (tx, mut rx) = mpsc::channel(8);
        validate_chain(
            store, &scheme, &[0; 192], false, false, true, &[], None, "default", &[], None, tx,
        )
        .await
        .unwrap();

        let mut last = None;
        while let Some(p) = rx.recv().await {
            last = Some(p);
        }
        let last = last.unwrap();
        assert_eq!(last.current, 0);
        assert_eq!(last.target, 1);
    }

    #[tokio::test]
    async fn up_to_bounds_the_walk_below_the_stored_last_round() {
        let store: Arc<dyn ChainStore> = Arc::new(MemStore::new(10));
        for round in 1..=5u64 {
            store
                .put(Beacon { round, signature: vec![0u8; 96], previous_signature: vec![] }, false)
                .await
                .unwrap();
        }
        let scheme = UnchainedScheme;
        let (tx, _rx) = mpsc::channel(16);
        let report = validate_chain(
            store,
            &scheme,
            &[0; 192],
            false,
            false,
            false,
            &[],
            None,
            "default",
            &[],
            Some(2),
            tx,
        )
        .await
        .unwrap();
        assert_eq!(report.target, 2);
    }
}
