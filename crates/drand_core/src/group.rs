//! Group membership for one epoch of a chain (§3).

use serde::{Deserialize, Serialize};

use crate::error::GroupError;

pub const DEFAULT_BEACON_ID: &str = "default";

/// Which digest/pairing-group convention a chain uses (§3, §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemeName {
    Chained,
    Unchained,
    #[serde(rename = "unchained-on-g1")]
    SigOnG1Swapped,
}

impl SchemeName {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Chained => "pedersen-bls-chained",
            Self::Unchained => "pedersen-bls-unchained",
            Self::SigOnG1Swapped => "bls-unchained-on-g1",
        }
    }

    pub fn is_chained(&self) -> bool {
        matches!(self, Self::Chained)
    }
}

/// One member of a `Group`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub index: u32,
    #[serde(with = "hex::serde")]
    pub identity: Vec<u8>,
    pub address: String,
    /// This node's public key share from the group's distributed key
    /// (real drand's `DistPublic` commitment evaluated at `index`),
    /// used by the partial signature cache to verify the node's
    /// partials without needing the private share itself.
    #[serde(with = "hex::serde")]
    pub public_key_share: Vec<u8>,
}

/// The consensus of participants for one epoch (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub period_seconds: u64,
    pub catchup_period_seconds: u64,
    pub genesis_time: i64,
    pub transition_time: i64,
    #[serde(with = "hex::serde")]
    pub genesis_seed: Vec<u8>,
    pub threshold: u32,
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    pub nodes: Vec<Node>,
    pub scheme_name: SchemeName,
    /// Monotonically increasing epoch counter, bumped on every reshare.
    pub epoch: u32,
}

impl Group {
    pub fn member_count(&self) -> usize {
        self.nodes.len()
    }

    /// Minimum safe threshold for `n` members: `floor(n/2) + 1`.
    pub fn min_safe_threshold(n: usize) -> u32 {
        (n / 2 + 1) as u32
    }

    /// Validates the structural invariants of §3: `threshold <= n`, and
    /// in practice `threshold >= floor(n/2)+1`.
    pub fn validate(&self) -> Result<(), GroupError> {
        let n = self.member_count();
        if self.threshold as usize > n {
            return Err(GroupError::ThresholdTooLarge {
                threshold: self.threshold,
                n,
            });
        }
        let min = Self::min_safe_threshold(n);
        if self.threshold < min {
            return Err(GroupError::ThresholdTooSmall {
                threshold: self.threshold,
                min,
                n,
            });
        }
        Ok(())
    }

    pub fn node_by_identity(&self, identity: &[u8]) -> Option<&Node> {
        self.nodes.iter().find(|n| n.identity == identity)
    }

    /// §4.G group validation for a DKG transition: the fields that must
    /// be stable across epochs of the same chain must actually match,
    /// and the new transition must lie in the future.
    pub fn validate_transition(old: &Group, new: &Group, now: i64) -> Result<(), GroupError> {
        if old.genesis_time != new.genesis_time {
            return Err(GroupError::ImmutableFieldChanged("genesis_time"));
        }
        if old.period_seconds != new.period_seconds {
            return Err(GroupError::ImmutableFieldChanged("period"));
        }
        if old.id != new.id {
            return Err(GroupError::ImmutableFieldChanged("id"));
        }
        if old.genesis_seed != new.genesis_seed {
            return Err(GroupError::ImmutableFieldChanged("genesis_seed"));
        }
        if old.scheme_name != new.scheme_name {
            return Err(GroupError::ImmutableFieldChanged("scheme_name"));
        }
        if new.transition_time <= now {
            return Err(GroupError::TransitionNotInFuture {
                transition_time: new.transition_time as u64,
                now: now as u64,
            });
        }
        new.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(i: u32) -> Node {
        Node {
            index: i,
            identity: vec![i as u8; 32],
            address: format!("127.0.0.1:1{i:03}"),
            public_key_share: vec![i as u8; 96],
        }
    }

    fn group(threshold: u32, n: u32) -> Group {
        Group {
            id: DEFAULT_BEACON_ID.to_string(),
            period_seconds: 30,
            catchup_period_seconds: 1,
            genesis_time: 1000,
            transition_time: 1000,
            genesis_seed: vec![0; 32],
            threshold,
            public_key: vec![1; 96],
            nodes: (0..n).map(node).collect(),
            scheme_name: SchemeName::Chained,
            epoch: 1,
        }
    }

    #[test]
    fn validate_rejects_threshold_above_member_count() {
        assert!(group(5, 4).validate().is_err());
    }

    #[test]
    fn validate_rejects_threshold_below_safe_minimum() {
        assert!(group(2, 4).validate().is_err());
        assert!(group(3, 4).validate().is_ok());
    }

    #[test]
    fn transition_rejects_changed_immutable_field() {
        let old = group(3, 4);
        let mut new = group(3, 4);
        new.genesis_time += 1;
        new.transition_time = old.genesis_time + 100;
        assert!(Group::validate_transition(&old, &new, 0).is_err());
    }

    #[test]
    fn transition_rejects_past_transition_time() {
        let old = group(3, 4);
        let mut new = group(3, 4);
        new.transition_time = 500;
        assert!(Group::validate_transition(&old, &new, 600).is_err());
    }

    #[test]
    fn transition_accepts_valid_reshare() {
        let old = group(3, 4);
        let mut new = group(4, 5);
        new.transition_time = 2000;
        assert!(Group::validate_transition(&old, &new, 1500).is_ok());
    }
}
