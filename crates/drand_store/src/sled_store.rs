//! Embedded B-tree file backend (§4.B), backed by `sled` the way
//! `ChainSafe-forest`'s `ipld/blockstore` uses it for its own
//! crash-safe, mmap-free embedded store.

use std::path::Path;

use async_trait::async_trait;
use drand_core::Beacon;
use tokio::sync::mpsc;

use crate::callbacks::{Callback, CallbackRegistry};
use crate::error::StoreError;
use crate::store::{round_key, BeaconCursor, ChainStore};

pub struct SledStore {
    db: sled::Db,
    callbacks: CallbackRegistry,
}

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn decode(bytes: &[u8]) -> Result<Beacon, StoreError> {
    serde_json::from_slice(bytes).map_err(backend_err)
}

fn encode(beacon: &Beacon) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(beacon).map_err(backend_err)
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(backend_err)?;
        Ok(Self {
            db,
            callbacks: CallbackRegistry::new(),
        })
    }
}

#[async_trait]
impl ChainStore for SledStore {
    async fn put(&self, beacon: Beacon, prev_required: bool) -> Result<(), StoreError> {
        let db = self.db.clone();
        let round = beacon.round;
        let key = round_key(round);
        let prev_key = round_key(round.saturating_sub(1));
        let encoded = encode(&beacon)?;

        let existing = tokio::task::spawn_blocking(move || -> Result<Option<Beacon>, StoreError> {
            if prev_required && round > 0 && db.get(prev_key).map_err(backend_err)?.is_none() {
                return Err(StoreError::MissingPrevious { round });
            }
            match db
                .compare_and_swap(key, None::<&[u8]>, Some(encoded))
                .map_err(backend_err)?
            {
                Ok(()) => Ok(None),
                Err(cas_err) => match cas_err.current {
                    Some(bytes) => Ok(Some(decode(&bytes)?)),
                    None => Err(StoreError::Backend("cas conflict without current value".into())),
                },
            }
        })
        .await
        .map_err(backend_err)??;

        match existing {
            None => {
                self.callbacks.notify(beacon).await;
                Ok(())
            }
            Some(stored) if stored == beacon => Err(StoreError::BeaconAlreadyStored(round)),
            Some(_) => Err(StoreError::ConflictingBeacon(round)),
        }
    }

    async fn get(&self, round: u64) -> Result<Beacon, StoreError> {
        let db = self.db.clone();
        let key = round_key(round);
        tokio::task::spawn_blocking(move || -> Result<Beacon, StoreError> {
            let bytes = db.get(key).map_err(backend_err)?.ok_or(StoreError::NoBeaconStored)?;
            decode(&bytes)
        })
        .await
        .map_err(backend_err)?
    }

    async fn last(&self) -> Result<Beacon, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Beacon, StoreError> {
            let (_, bytes) = db.last().map_err(backend_err)?.ok_or(StoreError::NoBeaconStored)?;
            decode(&bytes)
        })
        .await
        .map_err(backend_err)?
    }

    async fn del(&self, round: u64) -> Result<(), StoreError> {
        let db = self.db.clone();
        let key = round_key(round);
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            db.remove(key).map_err(backend_err)?;
            Ok(())
        })
        .await
        .map_err(backend_err)?
    }

    fn cursor(&self, from_round: u64) -> BeaconCursor {
        let db = self.db.clone();
        let (tx, rx) = mpsc::channel(32);
        tokio::task::spawn_blocking(move || {
            for entry in db.range(round_key(from_round)..) {
                let item = entry.map_err(backend_err).and_then(|(_, v)| decode(&v));
                if tx.blocking_send(item).is_err() {
                    return;
                }
            }
        });
        BeaconCursor::new(rx)
    }

    fn add_callback(&self, id: &str, cb: Callback) {
        self.callbacks.add(id, cb);
    }

    fn remove_callback(&self, id: &str) {
        self.callbacks.remove(id);
    }

    async fn close(&self) {
        if let Err(err) = self.db.flush_async().await {
            tracing::warn!(%err, "failed to flush sled store on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_last_round_trip() {
        let dir = tempdir();
        let store = SledStore::open(dir.path()).unwrap();
        let genesis = Beacon::genesis(vec![1; 32]);
        store.put(genesis.clone(), false).await.unwrap();
        assert_eq!(store.get(0).await.unwrap(), genesis);
        assert_eq!(store.last().await.unwrap(), genesis);
    }

    #[tokio::test]
    async fn conflicting_put_leaves_original_in_place() {
        let dir = tempdir();
        let store = SledStore::open(dir.path()).unwrap();
        let b1 = Beacon { round: 1, signature: vec![1; 96], previous_signature: vec![0; 32] };
        store.put(b1.clone(), false).await.unwrap();

        let conflicting = Beacon { round: 1, signature: vec![9; 96], previous_signature: vec![0; 32] };
        assert!(matches!(
            store.put(conflicting, false).await,
            Err(StoreError::ConflictingBeacon(1))
        ));
        assert_eq!(store.get(1).await.unwrap(), b1);
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().expect("failed to create temp dir for sled store test")
    }
}
