//! Per-request `Metadata{beacon_id, chain_hash, node_version}` (§6) and
//! the major/minor±1 compatibility rule it carries.

use std::fmt;
use std::str::FromStr;

use crate::error::NetError;

/// This build's own version, reported in every outbound `Metadata`.
pub const NODE_VERSION: NodeVersion = NodeVersion {
    major: env_major(),
    minor: env_minor(),
    patch: env_patch(),
};

const fn env_major() -> u32 {
    0
}
const fn env_minor() -> u32 {
    1
}
const fn env_patch() -> u32 {
    0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl NodeVersion {
    /// Two nodes interoperate iff same major and minor differs by at
    /// most 1 (§6). Breaking-boundary bridge rules are a documented,
    /// per-release exception this type leaves a hook for but does not
    /// itself encode.
    pub fn is_compatible_with(&self, other: &NodeVersion) -> bool {
        self.major == other.major && self.minor.abs_diff(other.minor) <= 1
    }
}

impl fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for NodeVersion {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(NetError::MalformedVersion(s.to_string()));
        };
        let parse = |p: &str| p.parse::<u32>().map_err(|_| NetError::MalformedVersion(s.to_string()));
        Ok(NodeVersion {
            major: parse(major)?,
            minor: parse(minor)?,
            patch: parse(patch)?,
        })
    }
}

/// Application-level mirror of `drand_proto::Metadata`, kept separate
/// from the generated type so the rest of the crate graph never
/// depends directly on prost's wire representation.
#[derive(Clone, Debug)]
pub struct Metadata {
    pub beacon_id: String,
    pub chain_hash: Vec<u8>,
    pub node_version: NodeVersion,
}

impl Metadata {
    pub fn new(beacon_id: impl Into<String>, chain_hash: Vec<u8>) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            chain_hash,
            node_version: NODE_VERSION,
        }
    }

    pub fn require_compatible(&self, address: &str) -> Result<(), NetError> {
        if NODE_VERSION.is_compatible_with(&self.node_version) {
            Ok(())
        } else {
            Err(NetError::IncompatibleVersion {
                address: address.to_string(),
                ours: NODE_VERSION.to_string(),
                theirs: self.node_version.to_string(),
            })
        }
    }
}

impl From<&Metadata> for drand_proto::Metadata {
    fn from(m: &Metadata) -> Self {
        drand_proto::Metadata {
            beacon_id: m.beacon_id.clone(),
            chain_hash: m.chain_hash.clone(),
            node_version: m.node_version.to_string(),
        }
    }
}

impl TryFrom<drand_proto::Metadata> for Metadata {
    type Error = NetError;

    fn try_from(m: drand_proto::Metadata) -> Result<Self, Self::Error> {
        Ok(Metadata {
            beacon_id: m.beacon_id,
            chain_hash: m.chain_hash,
            node_version: m.node_version.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_major_minor_plus_one_is_compatible() {
        let ours = NodeVersion { major: 1, minor: 4, patch: 0 };
        let theirs = NodeVersion { major: 1, minor: 5, patch: 2 };
        assert!(ours.is_compatible_with(&theirs));
    }

    #[test]
    fn different_major_is_incompatible() {
        let ours = NodeVersion { major: 1, minor: 4, patch: 0 };
        let theirs = NodeVersion { major: 2, minor: 4, patch: 0 };
        assert!(!ours.is_compatible_with(&theirs));
    }

    #[test]
    fn minor_gap_of_two_is_incompatible() {
        let ours = NodeVersion { major: 1, minor: 4, patch: 0 };
        let theirs = NodeVersion { major: 1, minor: 6, patch: 0 };
        assert!(!ours.is_compatible_with(&theirs));
    }

    #[test]
    fn parses_and_displays_round_trip() {
        let v: NodeVersion = "1.4.2".parse().unwrap();
        assert_eq!(v.to_string(), "1.4.2");
    }

    #[test]
    fn rejects_malformed_version_string() {
        assert!("1.4".parse::<NodeVersion>().is_err());
        assert!("1.4.x".parse::<NodeVersion>().is_err());
    }
}
