//! The Beacon Engine (§4.F): a `BeaconProcess` owns one group/share
//! pair and ticks rounds forward, signing a partial at each round
//! boundary, broadcasting it to peers, and completing the round
//! locally once the partial cache reaches threshold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use drand_core::{current_round, next_round, Beacon, Group, PartialSignature, Scheme, Share};
use drand_net::{client, Metadata, PeerPool};
use drand_store::{CacheError, ChainStore, Insert, PartialCache, StoreError};
use tokio::sync::{watch, RwLock};

use crate::error::EngineError;
use crate::threshold_monitor::ThresholdFailureMonitor;

/// Coarse process state, surfaced to `Status`/`RemoteStatus` (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Running,
    CatchingUp,
    Transitioning,
    Stopped,
}

struct Locked {
    group: Group,
    share: Share,
    chain_hash: Vec<u8>,
    state: ProcessState,
}

/// One beacon id's round-production state machine, generic over the
/// signature scheme in use for this chain.
pub struct BeaconProcess<S: Scheme> {
    beacon_id: String,
    scheme: S,
    store: Arc<dyn ChainStore>,
    cache: Arc<PartialCache>,
    pool: Arc<PeerPool>,
    monitor: Arc<ThresholdFailureMonitor>,
    locked: RwLock<Locked>,
    stop_tx: watch::Sender<bool>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}

fn public_shares_by_index(group: &Group) -> HashMap<u32, Vec<u8>> {
    group
        .nodes
        .iter()
        .map(|n| (n.index, n.public_key_share.clone()))
        .collect()
}

async fn sleep_until_unix(target: i64) {
    let now = unix_now();
    let delay = (target - now).max(0) as u64;
    tokio::time::sleep(Duration::from_secs(delay)).await;
}

impl<S: Scheme> BeaconProcess<S> {
    pub fn new(
        beacon_id: impl Into<String>,
        scheme: S,
        group: Group,
        share: Share,
        chain_hash: Vec<u8>,
        store: Arc<dyn ChainStore>,
        cache: Arc<PartialCache>,
        pool: Arc<PeerPool>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let beacon_id = beacon_id.into();
        let monitor = Arc::new(ThresholdFailureMonitor::new(
            beacon_id.clone(),
            Duration::from_secs(600),
            3,
        ));
        Self {
            beacon_id,
            scheme,
            store,
            cache,
            pool,
            monitor,
            locked: RwLock::new(Locked {
                group,
                share,
                chain_hash,
                state: ProcessState::Idle,
            }),
            stop_tx,
        }
    }

    pub fn beacon_id(&self) -> &str {
        &self.beacon_id
    }

    pub async fn state(&self) -> ProcessState {
        self.locked.read().await.state
    }

    pub async fn chain_hash(&self) -> Vec<u8> {
        self.locked.read().await.chain_hash.clone()
    }

    pub async fn group(&self) -> Group {
        self.locked.read().await.group.clone()
    }

    pub async fn store_get(&self, round: u64) -> Result<Beacon, StoreError> {
        self.store.get(round).await
    }

    pub async fn store_last(&self) -> Result<Beacon, StoreError> {
        self.store.last().await
    }

    pub async fn store_cursor(&self, from_round: u64) -> drand_store::BeaconCursor {
        self.store.cursor(from_round)
    }

    pub fn store_arc(&self) -> Arc<dyn ChainStore> {
        Arc::clone(&self.store)
    }

    pub fn monitor(&self) -> &ThresholdFailureMonitor {
        &self.monitor
    }

    /// The round-tick loop (§4.F): runs until `stop`/`stop_at` fires.
    /// Intended to be spawned as this process's dedicated task.
    pub async fn run(self: Arc<Self>) {
        {
            let mut locked = self.locked.write().await;
            if locked.state == ProcessState::Idle {
                locked.state = ProcessState::Running;
            }
        }

        let mut stop_rx = self.stop_tx.subscribe();
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let (period, genesis_time) = {
                let locked = self.locked.read().await;
                (locked.group.period_seconds, locked.group.genesis_time)
            };

            let now = unix_now();
            let (round, at) = match next_round(now, period, genesis_time) {
                Ok(v) => v,
                Err(err) => {
                    tracing::error!(beacon_id = %self.beacon_id, %err, "clock error, halting tick loop");
                    break;
                }
            };

            tokio::select! {
                _ = sleep_until_unix(at) => {}
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if *stop_rx.borrow() {
                break;
            }

            self.produce_round(round).await;
        }

        self.locked.write().await.state = ProcessState::Stopped;
    }

    async fn produce_round(&self, round: u64) {
        let (group, share, chain_hash) = {
            let locked = self.locked.read().await;
            (locked.group.clone(), locked.share.clone(), locked.chain_hash.clone())
        };

        let previous_signature = match self.previous_signature_for(round).await {
            Some(sig) => sig,
            None => {
                // Round is missed: the previous round hasn't completed
                // yet. The engine does not block on it (§4.D) — the
                // syncer or a later round's partials may fill it in.
                tracing::warn!(beacon_id = %self.beacon_id, round, "previous round not yet available, skipping tick");
                return;
            }
        };

        let digest = self.scheme.digest(round, &previous_signature);
        let partial_value = match self.scheme.sign(&share.private, &digest) {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(beacon_id = %self.beacon_id, round, %err, "local signing failed, round skipped");
                return;
            }
        };

        let partial = PartialSignature {
            index: share.index,
            value: partial_value.clone(),
        };

        self.insert_and_maybe_complete(round, previous_signature.clone(), partial)
            .await;

        self.broadcast_partial(&group, &chain_hash, round, previous_signature, share.index, partial_value)
            .await;
    }

    async fn previous_signature_for(&self, round: u64) -> Option<Vec<u8>> {
        if round == 0 {
            return None;
        }
        match self.store.get(round - 1).await {
            Ok(beacon) => Some(beacon.signature),
            Err(StoreError::NoBeaconStored) => None,
            Err(err) => {
                tracing::error!(beacon_id = %self.beacon_id, %err, "store read failed while producing round");
                None
            }
        }
    }

    async fn broadcast_partial(
        &self,
        group: &Group,
        chain_hash: &[u8],
        round: u64,
        previous_signature: Vec<u8>,
        index: u32,
        value: Vec<u8>,
    ) {
        let metadata = Metadata::new(self.beacon_id.clone(), chain_hash.to_vec());
        for node in &group.nodes {
            if node.index == index {
                continue;
            }
            let packet = drand_proto::PartialBeaconPacket {
                metadata: Some((&metadata).into()),
                round,
                previous_signature: previous_signature.clone(),
                partial_index: index,
                partial_value: value.clone(),
            };
            if client::send_partial(&self.pool, &node.address, packet).await.is_err() {
                self.monitor.record_failure(&node.address);
            } else {
                self.monitor.record_success(&node.address);
            }
        }
    }

    /// Handles a partial arriving over RPC (§4.D "Incoming partial"),
    /// or one produced locally by this process's own tick.
    pub async fn insert_and_maybe_complete(
        &self,
        round: u64,
        previous_signature: Vec<u8>,
        partial: PartialSignature,
    ) -> Result<(), CacheError> {
        let outcome = self
            .cache
            .insert(&self.scheme, round, previous_signature, partial)?;

        match outcome {
            Insert::Completed(beacon) => {
                self.store_completed_beacon(beacon).await;
            }
            Insert::RecoveryFailed => {
                tracing::warn!(beacon_id = %self.beacon_id, round, "threshold reached but recovered signature failed verification, keeping bucket open");
            }
            Insert::Pending => {}
        }
        Ok(())
    }

    async fn store_completed_beacon(&self, beacon: Beacon) {
        let round = beacon.round;
        let prev_required = self
            .locked
            .read()
            .await
            .group
            .scheme_name
            .is_chained();
        match self.store.put(beacon, prev_required).await {
            Ok(()) => {
                self.cache.observe_stored(round);
            }
            Err(StoreError::BeaconAlreadyStored(_)) => {
                self.cache.observe_stored(round);
            }
            Err(err) => {
                tracing::error!(beacon_id = %self.beacon_id, round, %err, "store failure, escalating");
            }
        }
    }

    /// §4.G transition 1: membership continuity across a DKG reshare.
    pub async fn transition_new_group(
        self: &Arc<Self>,
        new_share: Share,
        new_group: Group,
    ) -> Result<(), EngineError> {
        let now = unix_now();
        {
            let locked = self.locked.read().await;
            drand_core::Group::validate_transition(&locked.group, &new_group, now)?;
        }

        if new_group.epoch == 1 {
            self.cache.update_group(
                new_group.threshold as usize,
                new_group.public_key.clone(),
                public_shares_by_index(&new_group),
            );
            let mut locked = self.locked.write().await;
            locked.group = new_group;
            locked.share = new_share;
            locked.state = ProcessState::Running;
            return Ok(());
        }

        let transition_time = new_group.transition_time;
        {
            let mut locked = self.locked.write().await;
            locked.state = ProcessState::Transitioning;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            sleep_until_unix(transition_time).await;
            this.cache.update_group(
                new_group.threshold as usize,
                new_group.public_key.clone(),
                public_shares_by_index(&new_group),
            );
            let mut locked = this.locked.write().await;
            locked.group = new_group;
            locked.share = new_share;
            locked.state = ProcessState::Running;
            tracing::info!(beacon_id = %this.beacon_id, transition_time, "swapped to new group/share at transition time");
        });

        Ok(())
    }

    /// Halts ticking immediately.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Halts ticking at `at` (unix seconds), without blocking the caller.
    pub fn stop_at(self: &Arc<Self>, at: i64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            sleep_until_unix(at).await;
            this.stop();
        });
    }
}
