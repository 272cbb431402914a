//! The `Control` gRPC service (§6): local admin surface, bound to a
//! loopback listener only — never exposed off-host.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use drand_proto::control_server::Control;
use drand_proto::{
    BackupRequest, BeaconIdRequest, Empty, ListBeaconIDsResponse, ListSchemesResponse,
    RemoteStatusRequest, RemoteStatusResponse, StartSyncRequest, SyncProgress,
};
use drand_core::SchemeName;
use drand_net::{Metadata, PeerPool};
use drand_store::{ChainStore, SledStore};
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use crate::config::BeaconPaths;
use crate::supervisor::Supervisor;
use crate::{syncer, validator};

pub struct ControlService {
    supervisor: Arc<Supervisor>,
    config_root: PathBuf,
    pool: Arc<PeerPool>,
}

impl ControlService {
    pub fn new(supervisor: Arc<Supervisor>, config_root: PathBuf, pool: Arc<PeerPool>) -> Self {
        Self {
            supervisor,
            config_root,
            pool,
        }
    }
}

#[tonic::async_trait]
impl Control for ControlService {
    async fn shutdown(&self, request: Request<BeaconIdRequest>) -> Result<Response<Empty>, Status> {
        let id = request.into_inner().beacon_id;
        self.supervisor.shutdown(if id.is_empty() { None } else { Some(id.as_str()) }).await;
        Ok(Response::new(Empty { metadata: None }))
    }

    async fn load_beacon(&self, request: Request<BeaconIdRequest>) -> Result<Response<Empty>, Status> {
        let beacon_id = request.into_inner().beacon_id;
        let paths = BeaconPaths::new(&self.config_root, &beacon_id);
        let group = paths.load_group().map_err(|e| Status::not_found(e.to_string()))?;
        let share = paths.load_share().map_err(|e| Status::not_found(e.to_string()))?;
        let store: Arc<dyn ChainStore> = Arc::new(
            SledStore::open(paths.db_dir()).map_err(|e| Status::internal(e.to_string()))?,
        );

        self.supervisor
            .load_beacon(beacon_id, group, share, store)
            .await
            .map_err(|e| Status::from(&e))?;
        Ok(Response::new(Empty { metadata: None }))
    }

    async fn backup_database(&self, request: Request<BackupRequest>) -> Result<Response<Empty>, Status> {
        let request = request.into_inner();
        let beacon_id = request
            .metadata
            .map(|m| m.beacon_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| drand_core::DEFAULT_BEACON_ID.to_string());
        let paths = BeaconPaths::new(&self.config_root, &beacon_id);

        copy_dir(&paths.db_dir(), std::path::Path::new(&request.output_file))
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(Empty { metadata: None }))
    }

    type StartFollowChainStream = Pin<Box<dyn Stream<Item = Result<SyncProgress, Status>> + Send + 'static>>;

    async fn start_follow_chain(
        &self,
        request: Request<StartSyncRequest>,
    ) -> Result<Response<Self::StartFollowChainStream>, Status> {
        let request = request.into_inner();
        let process = self
            .supervisor
            .process(&request.beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        let (progress_tx, progress_rx) = tokio::sync::mpsc::channel(16);
        let (out_tx, out_rx) = tokio::sync::mpsc::channel(16);
        let pool = Arc::clone(&self.pool);
        let beacon_id = request.beacon_id.clone();

        tokio::spawn(async move {
            let group = process.group().await;
            let chain_hash = process.chain_hash().await;
            let scheme = drand_core::scheme::from_name(group.scheme_name);
            let result = syncer::follow_chain(
                process.store_arc(),
                scheme.as_ref(),
                &group.public_key,
                group.scheme_name.is_chained(),
                &request.nodes,
                request.up_to,
                &beacon_id,
                &chain_hash,
                &pool,
                progress_tx,
            )
            .await;
            if let Err(err) = result {
                tracing::warn!(%err, "start_follow_chain ended with an error");
            }
        });

        tokio::spawn(async move {
            let mut progress_rx = progress_rx;
            while let Some(p) = progress_rx.recv().await {
                if out_tx
                    .send(Ok(SyncProgress { current: p.current, target: p.target }))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(out_rx))))
    }

    type StartCheckChainStream = Pin<Box<dyn Stream<Item = Result<SyncProgress, Status>> + Send + 'static>>;

    async fn start_check_chain(
        &self,
        request: Request<StartSyncRequest>,
    ) -> Result<Response<Self::StartCheckChainStream>, Status> {
        let request = request.into_inner();
        let process = self
            .supervisor
            .process(&request.beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        let (progress_tx, progress_rx) = tokio::sync::mpsc::channel(16);
        let (out_tx, out_rx) = tokio::sync::mpsc::channel(16);
        let pool = Arc::clone(&self.pool);
        let beacon_id = request.beacon_id.clone();
        // dry_run and repair are opposite modes of the same walk (§4.E):
        // a dry run never fetches repairs from peers.
        let dry_run = request.dry_run;
        let repair = !dry_run;
        let up_to = (request.up_to > 0).then_some(request.up_to);

        tokio::spawn(async move {
            let group = process.group().await;
            let chain_hash = process.chain_hash().await;
            let scheme = drand_core::scheme::from_name(group.scheme_name);
            let result = validator::validate_chain(
                process.store_arc(),
                scheme.as_ref(),
                &group.public_key,
                group.scheme_name.is_chained(),
                repair,
                dry_run,
                &request.nodes,
                Some(&pool),
                &beacon_id,
                &chain_hash,
                up_to,
                progress_tx,
            )
            .await;
            if let Err(err) = result {
                tracing::warn!(%err, "start_check_chain ended with an error");
            }
        });

        tokio::spawn(async move {
            let mut progress_rx = progress_rx;
            while let Some(p) = progress_rx.recv().await {
                if out_tx
                    .send(Ok(SyncProgress { current: p.current, target: p.target }))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(out_rx))))
    }

    async fn list_beacon_ids(&self, _request: Request<Empty>) -> Result<Response<ListBeaconIDsResponse>, Status> {
        Ok(Response::new(ListBeaconIDsResponse {
            ids: self.supervisor.beacon_ids().await,
        }))
    }

    async fn list_schemes(&self, _request: Request<Empty>) -> Result<Response<ListSchemesResponse>, Status> {
        let ids = [SchemeName::Chained, SchemeName::Unchained, SchemeName::SigOnG1Swapped]
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        Ok(Response::new(ListSchemesResponse { ids }))
    }

    async fn remote_status(
        &self,
        request: Request<RemoteStatusRequest>,
    ) -> Result<Response<RemoteStatusResponse>, Status> {
        let request = request.into_inner();
        let metadata = request
            .metadata
            .map(|m| Metadata {
                beacon_id: m.beacon_id,
                chain_hash: m.chain_hash,
                node_version: drand_net::NODE_VERSION,
            })
            .unwrap_or_else(|| Metadata::new("", vec![]));

        let mut statuses = std::collections::HashMap::new();
        for address in request.addresses {
            let channel = self.pool.channel(&address).await;
            let ok = match channel {
                Ok(channel) => drand_net::client::get_identity(channel, metadata.clone()).await.is_ok(),
                Err(_) => false,
            };
            statuses.insert(address, ok);
        }
        Ok(Response::new(RemoteStatusResponse { statuses }))
    }
}

fn copy_dir(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
