//! Network plumbing shared by the daemon and the control CLI: typed
//! `Metadata`, the version-compatibility gate, a pooled gRPC client
//! per peer, and thin wrappers over the generated stubs.

pub mod client;
pub mod error;
pub mod metadata;
pub mod peer_pool;

pub use error::NetError;
pub use metadata::{Metadata, NodeVersion, NODE_VERSION};
pub use peer_pool::{PeerPool, PeerState};
