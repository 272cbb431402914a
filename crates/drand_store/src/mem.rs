//! In-memory ring buffer backend: fixed capacity, evicts the oldest
//! round once full. Used by nodes joining with no durable state yet
//! (§8 scenario 3: "new node starts with empty store").

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use drand_core::Beacon;
use tokio::sync::mpsc;

use crate::callbacks::{Callback, CallbackRegistry};
use crate::error::StoreError;
use crate::store::{BeaconCursor, ChainStore};

struct Inner {
    rounds: BTreeMap<u64, Beacon>,
    order: VecDeque<u64>,
    last: Option<u64>,
}

pub struct MemStore {
    capacity: usize,
    inner: Mutex<Inner>,
    callbacks: CallbackRegistry,
}

impl MemStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                rounds: BTreeMap::new(),
                order: VecDeque::new(),
                last: None,
            }),
            callbacks: CallbackRegistry::new(),
        }
    }
}

#[async_trait]
impl ChainStore for MemStore {
    async fn put(&self, beacon: Beacon, prev_required: bool) -> Result<(), StoreError> {
        let round = beacon.round;
        let notify = {
            let mut inner = self.inner.lock().expect("mem store lock poisoned");

            if let Some(existing) = inner.rounds.get(&round) {
                return if *existing == beacon {
                    Err(StoreError::BeaconAlreadyStored(round))
                } else {
                    Err(StoreError::ConflictingBeacon(round))
                };
            }

            if prev_required && round > 0 && !inner.rounds.contains_key(&(round - 1)) {
                return Err(StoreError::MissingPrevious { round });
            }

            inner.rounds.insert(round, beacon.clone());
            inner.order.push_back(round);
            if inner.last.map(|l| round > l).unwrap_or(true) {
                inner.last = Some(round);
            }
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.rounds.remove(&oldest);
                }
            }
            beacon
        };
        self.callbacks.notify(notify).await;
        Ok(())
    }

    async fn get(&self, round: u64) -> Result<Beacon, StoreError> {
        let inner = self.inner.lock().expect("mem store lock poisoned");
        inner.rounds.get(&round).cloned().ok_or(StoreError::NoBeaconStored)
    }

    async fn last(&self) -> Result<Beacon, StoreError> {
        let inner = self.inner.lock().expect("mem store lock poisoned");
        let round = inner.last.ok_or(StoreError::NoBeaconStored)?;
        inner.rounds.get(&round).cloned().ok_or(StoreError::NoBeaconStored)
    }

    async fn del(&self, round: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("mem store lock poisoned");
        inner.rounds.remove(&round);
        inner.order.retain(|r| *r != round);
        if inner.last == Some(round) {
            inner.last = inner.rounds.keys().next_back().copied();
        }
        Ok(())
    }

    fn cursor(&self, from_round: u64) -> BeaconCursor {
        let snapshot: Vec<Beacon> = {
            let inner = self.inner.lock().expect("mem store lock poisoned");
            inner
                .rounds
                .range(from_round..)
                .map(|(_, b)| b.clone())
                .collect()
        };
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for beacon in snapshot {
                if tx.send(Ok(beacon)).await.is_err() {
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

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_on_empty_store_is_no_beacon_stored() {
        let store = MemStore::new(10);
        assert!(matches!(store.last().await, Err(StoreError::NoBeaconStored)));
    }

    #[tokio::test]
    async fn put_genesis_then_last_returns_it() {
        let store = MemStore::new(10);
        let genesis = Beacon::genesis(vec![1; 32]);
        store.put(genesis.clone(), false).await.unwrap();
        assert_eq!(store.last().await.unwrap(), genesis);
    }

    #[tokio::test]
    async fn put_is_append_only_outside_repair() {
        let store = MemStore::new(10);
        let b1 = Beacon { round: 1, signature: vec![1; 96], previous_signature: vec![0; 32] };
        store.put(b1.clone(), false).await.unwrap();

        let conflicting = Beacon { round: 1, signature: vec![2; 96], previous_signature: vec![0; 32] };
        let err = store.put(conflicting, false).await.unwrap_err();
        assert!(matches!(err, StoreError::ConflictingBeacon(1)));
        assert_eq!(store.get(1).await.unwrap(), b1);

        let duplicate = store.put(b1, false).await.unwrap_err();
        assert!(matches!(duplicate, StoreError::BeaconAlreadyStored(1)));
    }

    #[tokio::test]
    async fn prev_required_rejects_gaps() {
        let store = MemStore::new(10);
        let round2 = Beacon { round: 2, signature: vec![1; 96], previous_signature: vec![0; 96] };
        let err = store.put(round2, true).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingPrevious { round: 2 }));
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_round_past_capacity() {
        let store = MemStore::new(2);
        for round in 0..3u64 {
            let beacon = Beacon { round, signature: vec![round as u8; 96], previous_signature: vec![] };
            store.put(beacon, false).await.unwrap();
        }
        assert!(matches!(store.get(0).await, Err(StoreError::NoBeaconStored)));
        assert!(store.get(1).await.is_ok());
        assert!(store.get(2).await.is_ok());
    }

    #[tokio::test]
    async fn cursor_yields_rounds_in_ascending_order() {
        let store = MemStore::new(10);
        for round in 0..5u64 {
            let beacon = Beacon { round, signature: vec![round as u8; 96], previous_signature: vec![] };
            store.put(beacon, false).await.unwrap();
        }
        let mut cursor = store.cursor(2);
        let mut rounds = Vec::new();
        while let Some(Ok(beacon)) = cursor.next().await {
            rounds.push(beacon.round);
        }
        assert_eq!(rounds, vec![2, 3, 4]);
    }
}
