//! The beacon, the atomic chain element (§3).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Big-endian encoding of a round number, used both as the store's key
/// (§4.B) and as part of the unchained/chained scheme digests (§4.F).
pub fn round_to_bytes(round: u64) -> [u8; 8] {
    round.to_be_bytes()
}

/// One round's randomness record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub round: u64,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    #[serde(
        with = "hex::serde",
        default,
        skip_serializing_if = "Vec::is_empty",
        rename = "previous_signature"
    )]
    pub previous_signature: Vec<u8>,
}

impl Beacon {
    pub fn genesis(genesis_seed: Vec<u8>) -> Self {
        Self {
            round: 0,
            signature: genesis_seed,
            previous_signature: Vec::new(),
        }
    }

    /// `SHA-256(signature)`, the public randomness output (§3).
    pub fn randomness(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.signature);
        hasher.finalize().to_vec()
    }
}

/// Wire-facing JSON shape used by the streaming/REST surfaces (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconJson {
    pub round: u64,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_signature: Option<String>,
    pub randomness: String,
}

impl From<&Beacon> for BeaconJson {
    fn from(b: &Beacon) -> Self {
        Self {
            round: b.round,
            signature: hex::encode(&b.signature),
            previous_signature: if b.previous_signature.is_empty() {
                None
            } else {
                Some(hex::encode(&b.previous_signature))
            },
            randomness: hex::encode(b.randomness()),
        }
    }
}

/// One node's contribution toward a threshold signature for a round (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialBeaconPacket {
    pub round: u64,
    pub previous_signature: Vec<u8>,
    pub partial_sig: PartialSignature,
}

/// A single (signer index, signature share) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialSignature {
    pub index: u32,
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_bytes_is_big_endian() {
        assert_eq!(round_to_bytes(256), [0, 0, 0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn beacon_json_round_trip_is_identity() {
        let beacon = Beacon {
            round: 3,
            signature: vec![1, 2, 3],
            previous_signature: vec![4, 5, 6],
        };
        let json = BeaconJson::from(&beacon);
        let serialized = serde_json::to_string(&json).unwrap();
        let parsed: BeaconJson = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed.round, json.round);
        assert_eq!(parsed.signature, json.signature);
        assert_eq!(parsed.previous_signature, json.previous_signature);
        assert_eq!(parsed.randomness, json.randomness);
    }

    #[test]
    fn genesis_beacon_has_no_previous_signature() {
        let genesis = Beacon::genesis(vec![9; 32]);
        assert_eq!(genesis.round, 0);
        assert!(genesis.previous_signature.is_empty());
    }
}
