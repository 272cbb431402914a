//! The `Public` gRPC service (§6): randomness and chain-identity
//! surface, exposed to any caller.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use drand_proto::public_server::Public;
use drand_proto::{ChainInfoPacket, ChainInfoRequest, Empty, PublicRandRequest, PublicRandResponse};
use drand_store::StoreError;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

/// Disambiguates concurrent `PublicRandStream` callers in `CallbackRegistry`.
static STREAM_ID: AtomicU64 = AtomicU64::new(0);

use crate::supervisor::Supervisor;

pub struct PublicService {
    supervisor: Arc<Supervisor>,
}

impl PublicService {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
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
}

fn to_response(beacon: drand_core::Beacon) -> PublicRandResponse {
    let randomness = beacon.randomness();
    PublicRandResponse {
        round: beacon.round,
        signature: beacon.signature,
        previous_signature: beacon.previous_signature,
        randomness,
    }
}

#[tonic::async_trait]
impl Public for PublicService {
    async fn public_rand(
        &self,
        request: Request<PublicRandRequest>,
    ) -> Result<Response<PublicRandResponse>, Status> {
        let request = request.into_inner();
        let beacon_id = self.resolve(&request.metadata).await?;
        let process = self
            .supervisor
            .process(&beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        // round=0 means "latest"; both paths read straight from the
        // durable store rather than the in-memory process state.
        let beacon = if request.round == 0 {
            process_last(&process).await
        } else {
            process_get(&process, request.round).await
        }?;
        Ok(Response::new(to_response(beacon)))
    }

    type PublicRandStreamStream =
        Pin<Box<dyn Stream<Item = Result<PublicRandResponse, Status>> + Send + 'static>>;

    async fn public_rand_stream(
        &self,
        request: Request<PublicRandRequest>,
    ) -> Result<Response<Self::PublicRandStreamStream>, Status> {
        let request = request.into_inner();
        let beacon_id = self.resolve(&request.metadata).await?;
        let process = self
            .supervisor
            .process(&beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        // The stream never ends on its own (§4.D): catch up from the
        // store, then stay open and forward newly-stored rounds as they
        // arrive via the store's callback registry, until the caller
        // cancels.
        let store = process.store_arc();
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let last_sent = Arc::new(AtomicU64::new(0));
        let callback_id = format!("public-rand-stream-{}", STREAM_ID.fetch_add(1, Ordering::Relaxed));

        let live_tx = tx.clone();
        let live_last_sent = Arc::clone(&last_sent);
        store.add_callback(
            &callback_id,
            Arc::new(move |beacon: &drand_core::Beacon| {
                if beacon.round <= live_last_sent.load(Ordering::SeqCst) {
                    return;
                }
                live_last_sent.store(beacon.round, Ordering::SeqCst);
                let _ = live_tx.try_send(Ok(to_response(beacon.clone())));
            }),
        );

        let drain_tx = tx;
        tokio::spawn(async move {
            let mut cursor = process.store_cursor(request.round).await;
            while let Some(item) = cursor.next().await {
                let mapped = match item {
                    Ok(beacon) => {
                        if beacon.round <= last_sent.load(Ordering::SeqCst) {
                            continue;
                        }
                        last_sent.store(beacon.round, Ordering::SeqCst);
                        Ok(to_response(beacon))
                    }
                    Err(e) => Err(Status::internal(e.to_string())),
                };
                if drain_tx.send(mapped).await.is_err() {
                    return;
                }
            }
            // Cursor drained; `drain_tx` is dropped here, leaving only
            // `live_tx`'s clone to keep the channel open for live
            // updates until the caller cancels the stream.
            drain_tx.closed().await;
            store.remove_callback(&callback_id);
        });

        Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))))
    }

    async fn chain_info(
        &self,
        request: Request<ChainInfoRequest>,
    ) -> Result<Response<ChainInfoPacket>, Status> {
        let request = request.into_inner();
        let beacon_id = self.resolve(&request.metadata).await?;
        let process = self
            .supervisor
            .process(&beacon_id)
            .await
            .ok_or_else(|| Status::not_found("beacon id not loaded"))?;

        let group = process.group().await;
        let hash = process.chain_hash().await;
        Ok(Response::new(ChainInfoPacket {
            public_key: group.public_key,
            period_seconds: group.period_seconds,
            genesis_time: group.genesis_time,
            hash,
            group_hash: drand_core::chain_hash(&group),
            scheme_id: group.scheme_name.id().to_string(),
        }))
    }

    async fn home(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty { metadata: None }))
    }
}

async fn process_last(
    process: &crate::supervisor::DynBeaconProcess,
) -> Result<drand_core::Beacon, Status> {
    process
        .store_last()
        .await
        .map_err(|e| status_from_store(&e))
}

async fn process_get(
    process: &crate::supervisor::DynBeaconProcess,
    round: u64,
) -> Result<drand_core::Beacon, Status> {
    process
        .store_get(round)
        .await
        .map_err(|e| status_from_store(&e))
}

fn status_from_store(err: &StoreError) -> Status {
    match err {
        StoreError::NoBeaconStored => Status::not_found(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}
