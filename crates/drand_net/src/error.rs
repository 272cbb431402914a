use thiserror::Error;

/// Error taxonomy for the network layer (§7 "Network" kind).
#[derive(Debug, Error)]
pub enum NetError {
    #[error("malformed node version string: {0:?}")]
    MalformedVersion(String),
    #[error("peer {address} is running an incompatible node version {theirs}, we are {ours}")]
    IncompatibleVersion {
        address: String,
        ours: String,
        theirs: String,
    },
    #[error("no peer registered for address {0}")]
    UnknownPeer(String),
    #[error("failed to dial peer {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("rpc to {address} failed: {source}")]
    Rpc {
        address: String,
        #[source]
        source: tonic::Status,
    },
}
