//! The `Protocol` gRPC service (§6): the peer-to-peer surface used by
//! members of the same group only.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use drand_core::PartialSignature;
use drand_proto::protocol_server::Protocol;
use drand_proto::{
    BeaconPacket, Empty, IdentityRequest, IdentityResponse, PartialBeaconPacket, StatusRequest,
    StatusResponse, SyncRequest,
};
use drand_net::Metadata;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use crate::engine::ProcessState;
use crate::supervisor::{DynBeaconProcess, Supervisor};

/// Disambiguates concurrent `SyncChain` callers in `CallbackRegistry`.
static STREAM_ID: AtomicU64 = AtomicU64::new(0);

pub struct ProtocolService {
    supervisor: Arc<Supervisor>,
    local_address: String,
    local_key: Vec<u8>,
}

impl ProtocolService {
    pub fn new(supervisor: Arc<Supervisor>, local_address: String, local_key: Vec<u8>) -> Self {
        Self {
            supervisor,
            local_address,
            local_key,
        }
    }

    async fn resolve(&self, metadata: &Option<drand_proto::Metadata>) -> Result<String, Status> {
        let (beacon_id, chain_hash) = metadata
            .as_ref()
            .map(|m| (m.beacon_id.clone(), m.chain_hash.clone()))
            .unwrap_or_default();
        self.supervisor
            .route(&beacon_id, &chain_hash)
            .await
            .map_err(|e| Status::from(&e))
    }

    /// Rejects requests from peers running an incompatible node version
    /// (§6), recording the rejection against that beacon's
    /// threshold-failure monitor.
    fn require_compatible_version(
        &self,
        metadata: &Option<drand_proto::Metadata>,
        peer: &str,
        process: &DynBeaconProcess,
    ) -> Result<(), Status> {
        let Some(raw) = metadata else { return Ok(()) };
        let parsed: Metadata = raw
            .clone()
            .try_into()
            .map_err(|e: drand_net::NetError| Status::invalid_argument(e.to_string()))?;
        if let Err(err) = parsed.require_compatible(peer) {
            process.monitor().record_failure(peer);
            return Err(Status::failed_precondition(err.to_string()));
        }
        Ok(())
    }
}

fn peer_address<T>(request: &Request<T>) -> String {
    request
        .remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown-peer".to_string())
}

#[tonic::async_trait]
impl Protocol for ProtocolService {
    async fn partial_beacon(
        &self,
        request: Request<PartialBeaconPacket>,
    ) -> Result<Response<Empty>, Status> {
        let peer = peer_address(&request);
        let packet = request.into_inner();
        let beacon_id = self.resolve(&packet.metadata).await?;
        let process = self
            .supervisor
            .process(&beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        self.require_compatible_version(&packet.metadata, &peer, &process)?;

        process
            .insert_and_maybe_complete(
                packet.round,
                packet.previous_signature,
                PartialSignature {
                    index: packet.partial_index,
                    value: packet.partial_value,
                },
            )
            .await
            .map_err(|e| Status::from(&e))?;

        Ok(Response::new(Empty { metadata: None }))
    }

    type SyncChainStream = Pin<Box<dyn Stream<Item = Result<BeaconPacket, Status>> + Send + 'static>>;

    async fn sync_chain(
        &self,
        request: Request<SyncRequest>,
    ) -> Result<Response<Self::SyncChainStream>, Status> {
        let peer = peer_address(&request);
        let request = request.into_inner();
        let beacon_id = self.resolve(&request.metadata).await?;
        let process = self
            .supervisor
            .process(&beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        self.require_compatible_version(&request.metadata, &peer, &process)?;

        // Stays open past the historical catch-up, forwarding newly
        // stored beacons via the store's callback registry (§4.D),
        // mirroring `PublicRandStream`'s live-tail behavior.
        let store = process.store_arc();
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let last_sent = Arc::new(AtomicU64::new(0));
        let callback_id = format!("sync-chain-{}", STREAM_ID.fetch_add(1, Ordering::Relaxed));

        let live_tx = tx.clone();
        let live_last_sent = Arc::clone(&last_sent);
        store.add_callback(
            &callback_id,
            Arc::new(move |beacon: &drand_core::Beacon| {
                if beacon.round <= live_last_sent.load(Ordering::SeqCst) {
                    return;
                }
                live_last_sent.store(beacon.round, Ordering::SeqCst);
                let _ = live_tx.try_send(Ok(BeaconPacket {
                    round: beacon.round,
                    signature: beacon.signature.clone(),
                    previous_signature: beacon.previous_signature.clone(),
                }));
            }),
        );

        let drain_tx = tx;
        tokio::spawn(async move {
            let mut cursor = process.store_cursor(request.from_round).await;
            while let Some(item) = cursor.next().await {
                let mapped = match item {
                    Ok(b) => {
                        if b.round <= last_sent.load(Ordering::SeqCst) {
                            continue;
                        }
                        last_sent.store(b.round, Ordering::SeqCst);
                        Ok(BeaconPacket {
                            round: b.round,
                            signature: b.signature,
                            previous_signature: b.previous_signature,
                        })
                    }
                    Err(e) => Err(Status::internal(e.to_string())),
                };
                if drain_tx.send(mapped).await.is_err() {
                    return;
                }
            }
            drain_tx.closed().await;
            store.remove_callback(&callback_id);
        });

        Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))))
    }

    async fn get_identity(
        &self,
        _request: Request<IdentityRequest>,
    ) -> Result<Response<IdentityResponse>, Status> {
        Ok(Response::new(IdentityResponse {
            address: self.local_address.clone(),
            key: self.local_key.clone(),
            signature: Vec::new(),
            scheme_name: String::new(),
        }))
    }

    async fn status(&self, request: Request<StatusRequest>) -> Result<Response<StatusResponse>, Status> {
        let request = request.into_inner();
        let beacon_id = self.resolve(&request.metadata).await?;
        let process = self
            .supervisor
            .process(&beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        let state = process.state().await;
        let last_stored_round = process.store_last().await.map(|b| b.round).unwrap_or(0);
        Ok(Response::new(StatusResponse {
            dkg_ongoing: state == ProcessState::Transitioning,
            epoch_active: state == ProcessState::Running,
            last_stored_round,
        }))
    }
}
