//! Thin typed wrappers over the generated `Protocol`/`Public` clients,
//! used by the daemon's syncer and beacon engine so neither has to
//! touch `drand_proto` or channel management directly.

use drand_proto::protocol_client::ProtocolClient;
use drand_proto::public_client::PublicClient;
use drand_proto::{
    BeaconPacket, IdentityRequest, IdentityResponse, PartialBeaconPacket, PublicRandRequest,
    PublicRandResponse, SyncRequest,
};
use tonic::transport::Channel;
use tonic::Streaming;

use crate::error::NetError;
use crate::metadata::Metadata;
use crate::peer_pool::PeerPool;

/// Sends one partial signature to `address`, logging (never
/// propagating as fatal) on dial or RPC failure — §4.D/§7: "RPC send
/// failures to peers are logged and counted; never fatal."
pub async fn send_partial(
    pool: &PeerPool,
    address: &str,
    packet: PartialBeaconPacket,
) -> Result<(), NetError> {
    let channel = pool.channel(address).await?;
    let mut client = ProtocolClient::new(channel);
    if let Err(status) = client.partial_beacon(packet).await {
        tracing::warn!(peer = address, %status, "partial beacon broadcast failed");
        pool.mark_disconnected(address);
    }
    Ok(())
}

/// Opens a `SyncChain` pull from `address` starting at `from_round`.
pub async fn pull_chain(
    pool: &PeerPool,
    address: &str,
    metadata: Metadata,
    from_round: u64,
) -> Result<Streaming<BeaconPacket>, NetError> {
    let channel = pool.channel(address).await?;
    let mut client = ProtocolClient::new(channel);
    let request = SyncRequest {
        metadata: Some((&metadata).into()),
        from_round,
    };
    let response = client
        .sync_chain(request)
        .await
        .map_err(|source| NetError::Rpc {
            address: address.to_string(),
            source,
        })?;
    Ok(response.into_inner())
}

pub async fn get_identity(channel: Channel, metadata: Metadata) -> Result<IdentityResponse, tonic::Status> {
    let mut client = ProtocolClient::new(channel);
    let response = client
        .get_identity(IdentityRequest {
            metadata: Some((&metadata).into()),
        })
        .await?;
    Ok(response.into_inner())
}

pub async fn public_rand(
    channel: Channel,
    metadata: Metadata,
    round: u64,
) -> Result<PublicRandResponse, tonic::Status> {
    let mut client = PublicClient::new(channel);
    let response = client
        .public_rand(PublicRandRequest {
            metadata: Some((&metadata).into()),
            round,
        })
        .await?;
    Ok(response.into_inner())
}
