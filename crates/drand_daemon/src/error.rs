use thiserror::Error;

use drand_core::{ClockError, GroupError, SchemeError};
use drand_store::{CacheError, StoreError};

/// Errors raised while producing or consuming rounds inside one
/// `BeaconProcess` (§4.F, §7).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("local signing failed, round is skipped: {0}")]
    SigningFailed(SchemeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("beacon process for {beacon_id} is not running")]
    NotRunning { beacon_id: String },

    #[error("group transition rejected: {0}")]
    Transition(#[from] GroupError),
}

/// Errors raised while syncing the chain from peers (§4.D).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Net(#[from] drand_net::NetError),

    #[error("peer sent a beacon that failed signature verification at round {round}")]
    InvalidBeacon { round: u64 },

    #[error("sync was cancelled")]
    Cancelled,

    #[error("tried all peers, latest synced round {last}")]
    TriedAllPeers { last: u64 },
}

/// Errors raised by the supervisor's routing and lifecycle management
/// (§4.G, §7 "Lifecycle").
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("unknown chain hash")]
    InvalidChainHash,

    #[error("beacon id {0} is not configured on this node")]
    UnknownBeaconId(String),

    #[error("group validation failed: {0}")]
    Group(#[from] GroupError),

    #[error("this node is not a member of either the old or the new group")]
    NotAMember,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl From<&EngineError> for tonic::Status {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::NotRunning { .. } => tonic::Status::failed_precondition(err.to_string()),
            EngineError::Store(StoreError::NoBeaconStored) => {
                tonic::Status::not_found(err.to_string())
            }
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}

impl From<&CacheError> for tonic::Status {
    fn from(err: &CacheError) -> Self {
        match err {
            CacheError::InvalidPartial => tonic::Status::invalid_argument(err.to_string()),
            CacheError::DuplicatePartial(_) => tonic::Status::already_exists(err.to_string()),
            CacheError::BucketFull(_) | CacheError::InvalidAggregate => {
                tonic::Status::resource_exhausted(err.to_string())
            }
        }
    }
}

impl From<&SupervisorError> for tonic::Status {
    fn from(err: &SupervisorError) -> Self {
        match err {
            SupervisorError::InvalidChainHash => tonic::Status::not_found(err.to_string()),
            SupervisorError::UnknownBeaconId(_) => tonic::Status::not_found(err.to_string()),
            SupervisorError::NotAMember | SupervisorError::Group(_) => {
                tonic::Status::failed_precondition(err.to_string())
            }
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
