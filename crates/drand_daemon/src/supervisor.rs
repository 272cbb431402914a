//! The Daemon Supervisor (§4.G): owns every beacon id's `BeaconProcess`,
//! routes inbound RPCs by `{beacon_id, chain_hash}`, and dispatches DKG
//! transition events to the right process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use drand_core::{chain_hash as compute_chain_hash, scheme, Group, Scheme, Share};
use drand_store::{ChainStore, PartialCache};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::config::BeaconPaths;
use crate::engine::BeaconProcess;
use crate::error::SupervisorError;

pub type DynBeaconProcess = BeaconProcess<Box<dyn Scheme>>;

/// One DKG completion event, fed in from the (out-of-scope) DKG
/// protocol and fanned out to the supervisor's transition dispatcher.
#[derive(Clone, Debug)]
pub struct SharingOutput {
    pub beacon_id: String,
    pub old: Option<Group>,
    pub new: Group,
    pub new_share: SharedShare,
}

/// `Share` wrapped for cheap cloning across the broadcast channel.
#[derive(Clone, Debug)]
pub struct SharedShare(pub Arc<Share>);

struct ProcessEntry {
    process: Arc<DynBeaconProcess>,
    tick_task: JoinHandle<()>,
}

pub struct Supervisor {
    local_identity: Vec<u8>,
    config_root: PathBuf,
    processes: RwLock<HashMap<String, ProcessEntry>>,
    chain_hashes: RwLock<HashMap<Vec<u8>, String>>,
    dkg_tx: broadcast::Sender<SharingOutput>,
}

impl Supervisor {
    pub fn new(local_identity: Vec<u8>, config_root: PathBuf) -> Arc<Self> {
        let (dkg_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            local_identity,
            config_root,
            processes: RwLock::new(HashMap::new()),
            chain_hashes: RwLock::new(HashMap::new()),
            dkg_tx,
        })
    }

    pub fn dkg_sender(&self) -> broadcast::Sender<SharingOutput> {
        self.dkg_tx.clone()
    }

    /// Resolves an inbound request's `{beacon_id, chain_hash}` pair to
    /// the beacon id that should serve it (§4.G "Routing").
    pub async fn route(&self, beacon_id: &str, chain_hash: &[u8]) -> Result<String, SupervisorError> {
        let canonical_id = if beacon_id.is_empty() {
            drand_core::DEFAULT_BEACON_ID
        } else {
            beacon_id
        };

        if !chain_hash.is_empty() {
            let chain_hashes = self.chain_hashes.read().await;
            return match chain_hashes.get(chain_hash) {
                Some(resolved) => {
                    if !beacon_id.is_empty() && beacon_id != resolved {
                        Err(SupervisorError::InvalidChainHash)
                    } else {
                        Ok(resolved.clone())
                    }
                }
                None => {
                    // Bootstrapping case: no group installed yet for this id.
                    let processes = self.processes.read().await;
                    if !processes.contains_key(canonical_id) {
                        Ok(canonical_id.to_string())
                    } else {
                        Err(SupervisorError::InvalidChainHash)
                    }
                }
            };
        }

        Ok(canonical_id.to_string())
    }

    /// Creates and starts a `BeaconProcess` for `beacon_id` (control
    /// plane `LoadBeacon`).
    pub async fn load_beacon(
        self: &Arc<Self>,
        beacon_id: String,
        group: Group,
        share: Share,
        store: Arc<dyn ChainStore>,
    ) -> Result<(), SupervisorError> {
        group.validate()?;
        let chain_hash = compute_chain_hash(&group);
        let scheme: Box<dyn Scheme> = scheme::from_name(group.scheme_name);

        let threshold = group.threshold as usize;
        let public_shares: HashMap<u32, Vec<u8>> = group
            .nodes
            .iter()
            .map(|n| (n.index, n.public_key_share.clone()))
            .collect();
        let cache = Arc::new(PartialCache::new(threshold, group.public_key.clone(), public_shares));

        let process = Arc::new(BeaconProcess::new(
            beacon_id.clone(),
            scheme,
            group,
            share,
            chain_hash.clone(),
            store,
            cache,
            Arc::new(drand_net::PeerPool::new()),
        ));

        let tick_task = {
            let process = Arc::clone(&process);
            tokio::spawn(async move {
                process.run().await;
            })
        };

        self.processes
            .write()
            .await
            .insert(beacon_id.clone(), ProcessEntry { process, tick_task });
        self.chain_hashes.write().await.insert(chain_hash, beacon_id);
        Ok(())
    }

    pub async fn process(&self, beacon_id: &str) -> Option<Arc<DynBeaconProcess>> {
        self.processes
            .read()
            .await
            .get(beacon_id)
            .map(|entry| Arc::clone(&entry.process))
    }

    pub async fn beacon_ids(&self) -> Vec<String> {
        self.processes.read().await.keys().cloned().collect()
    }

    /// Stops one beacon id's process, or every process if `beacon_id`
    /// is `None` (§4.G "Instance lifecycle"). Gives each process 5
    /// seconds to stop on its own before forcing termination.
    pub async fn shutdown(&self, beacon_id: Option<&str>) {
        let targets: Vec<String> = match beacon_id {
            Some(id) => vec![id.to_string()],
            None => self.beacon_ids().await,
        };

        for id in targets {
            let entry = self.processes.write().await.remove(&id);
            let Some(entry) = entry else { continue };
            entry.process.stop();

            let abort_handle = entry.tick_task.abort_handle();
            let grace = Duration::from_secs(5);
            if tokio::time::timeout(grace, entry.tick_task).await.is_err() {
                tracing::warn!(beacon_id = %id, "process did not stop within grace period, forcing termination");
                abort_handle.abort();
            }
        }
    }

    /// Consumes `SharingOutput` events forever, dispatching the
    /// appropriate transition (§4.G "DKG output handler"). Intended to
    /// be spawned once per supervisor.
    pub async fn run_dkg_listener(self: Arc<Self>) {
        let mut rx = self.dkg_tx.subscribe();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(err) = self.handle_sharing_output(event).await {
                        tracing::error!(%err, "failed to apply DKG sharing output");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "dkg listener lagged, some sharing outputs were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn handle_sharing_output(&self, event: SharingOutput) -> Result<(), SupervisorError> {
        let was_in_old = event
            .old
            .as_ref()
            .map(|g| g.node_by_identity(&self.local_identity).is_some())
            .unwrap_or(false);
        let is_in_new = event.new.node_by_identity(&self.local_identity).is_some();

        match (was_in_old, is_in_new) {
            (true, true) => self.transition(&event).await,
            (true, false) => self.leave_network(&event).await,
            (false, true) => self.join_network(&event).await,
            (false, false) => Err(SupervisorError::NotAMember),
        }
    }

    async fn transition(&self, event: &SharingOutput) -> Result<(), SupervisorError> {
        let process = self
            .process(&event.beacon_id)
            .await
            .ok_or_else(|| SupervisorError::UnknownBeaconId(event.beacon_id.clone()))?;
        process
            .transition_new_group((*event.new_share.0).clone(), event.new.clone())
            .await?;
        Ok(())
    }

    async fn leave_network(&self, event: &SharingOutput) -> Result<(), SupervisorError> {
        if let Some(entry) = self.processes.write().await.remove(&event.beacon_id) {
            entry.process.stop_at(event.new.transition_time - 1);
        }
        Ok(())
    }

    async fn join_network(&self, event: &SharingOutput) -> Result<(), SupervisorError> {
        let paths = BeaconPaths::new(&self.config_root, &event.beacon_id);
        paths.ensure_dirs()?;
        paths.store_group(&event.new)?;
        paths.store_share(&event.new_share.0)?;
        Ok(())
    }
}

