//! One pooled outbound gRPC connection per peer (§5 "Resource
//! policy"), reused across broadcasts and sync pulls, with a
//! connectivity gauge emitted per peer.

use std::collections::HashMap;
use std::sync::Mutex;

use tonic::transport::{Channel, Endpoint};

use crate::error::NetError;

/// Connectivity state surfaced per peer, mirroring the gauge named in
/// §5's resource policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    Connected,
    Disconnected,
}

struct Entry {
    channel: Channel,
    state: PeerState,
}

/// Lazily dials and caches one `Channel` per peer address.
pub struct PeerPool {
    peers: Mutex<HashMap<String, Entry>>,
}

impl PeerPool {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the pooled channel for `address`, dialing lazily on
    /// first use. Subsequent calls for the same address reuse the
    /// connection rather than opening a new one per RPC.
    pub async fn channel(&self, address: &str) -> Result<Channel, NetError> {
        if let Some(channel) = self.cached(address) {
            return Ok(channel);
        }

        let endpoint = Endpoint::from_shared(address.to_string()).map_err(|source| NetError::Dial {
            address: address.to_string(),
            source,
        })?;

        let connect = endpoint.connect().await;
        let mut peers = self.peers.lock().expect("peer pool lock poisoned");
        match connect {
            Ok(channel) => {
                peers.insert(
                    address.to_string(),
                    Entry {
                        channel: channel.clone(),
                        state: PeerState::Connected,
                    },
                );
                tracing::debug!(peer = address, "dialed peer");
                Ok(channel)
            }
            Err(source) => {
                peers
                    .entry(address.to_string())
                    .and_modify(|e| e.state = PeerState::Disconnected);
                tracing::warn!(peer = address, %source, "failed to dial peer");
                Err(NetError::Dial {
                    address: address.to_string(),
                    source,
                })
            }
        }
    }

    fn cached(&self, address: &str) -> Option<Channel> {
        self.peers
            .lock()
            .expect("peer pool lock poisoned")
            .get(address)
            .filter(|e| e.state == PeerState::Connected)
            .map(|e| e.channel.clone())
    }

    pub fn state_of(&self, address: &str) -> Option<PeerState> {
        self.peers
            .lock()
            .expect("peer pool lock poisoned")
            .get(address)
            .map(|e| e.state)
    }

    pub fn mark_disconnected(&self, address: &str) {
        if let Some(entry) = self.peers.lock().expect("peer pool lock poisoned").get_mut(address) {
            entry.state = PeerState::Disconnected;
        }
    }

    pub fn remove(&self, address: &str) {
        self.peers.lock().expect("peer pool lock poisoned").remove(address);
    }
}

impl Default for PeerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_peer_has_no_state() {
        let pool = PeerPool::new();
        assert!(pool.state_of("http://127.0.0.1:9000").is_none());
    }
}
