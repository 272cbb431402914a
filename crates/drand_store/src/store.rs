//! The `ChainStore` contract (§4.B): a keyed mapping from round to
//! `Beacon` with a distinguished "last" pointer, satisfied identically by
//! every backend.

use async_trait::async_trait;
use drand_core::Beacon;
use tokio::sync::mpsc;

use crate::callbacks::Callback;
use crate::error::StoreError;

/// Round keys are always big-endian 8-byte integers, so lexicographic key
/// order matches numeric order — critical for range scans and `last`.
pub fn round_key(round: u64) -> [u8; 8] {
    round.to_be_bytes()
}

/// Lazily yields beacons in round-ascending order starting from the round
/// a cursor was opened at. Backed by a bounded channel fed by a background
/// task so a slow consumer cannot hold the backend's internal lock open.
pub struct BeaconCursor {
    rx: mpsc::Receiver<Result<Beacon, StoreError>>,
}

impl BeaconCursor {
    pub fn new(rx: mpsc::Receiver<Result<Beacon, StoreError>>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Result<Beacon, StoreError>> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Stores `beacon`. If `prev_required`, round `R` (R > 0) may only be
    /// stored once round `R-1` is already present — the chained scheme's
    /// linkage requirement threaded as a per-call context flag rather than
    /// backend state, since the same backend serves chained and unchained
    /// beacon processes.
    async fn put(&self, beacon: Beacon, prev_required: bool) -> Result<(), StoreError>;

    async fn get(&self, round: u64) -> Result<Beacon, StoreError>;

    async fn last(&self) -> Result<Beacon, StoreError>;

    /// Removes a single beacon. Used only by the chain validator's repair
    /// path (§4.E) — never by normal round production.
    async fn del(&self, round: u64) -> Result<(), StoreError>;

    /// Opens a lazy, round-ascending cursor starting at `from_round`.
    fn cursor(&self, from_round: u64) -> BeaconCursor;

    fn add_callback(&self, id: &str, cb: Callback);

    fn remove_callback(&self, id: &str);

    async fn close(&self);
}
