//! Scheme polymorphism (§4.F, §9): chained, unchained, and the G1/G2
//! swapped variant differ only in their digest formula and in which
//! pairing group carries the signature. `BeaconProcess` (in
//! `drand_daemon`) is generic over any `Scheme` implementation.

use sha2::{Digest, Sha256};

use crate::bls;
use crate::error::SchemeError;
use crate::group::SchemeName;

/// A BLS signature scheme as used for one drand chain.
pub trait Scheme: Send + Sync + 'static {
    /// The scheme identifier string carried in `ChainInfo`/group files.
    fn name(&self) -> SchemeName;

    /// The message a round's signature is computed over.
    fn digest(&self, round: u64, previous_signature: &[u8]) -> Vec<u8>;

    /// Sign `message` with this node's private share.
    fn sign(&self, private_share: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError>;

    /// Verify `signature` over `message` against the group public key.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, SchemeError>;

    /// Recover a full threshold signature from `threshold` partials,
    /// indexed `(signer_index, partial_value)`.
    fn aggregate(&self, partials: &[(u32, Vec<u8>)]) -> Result<Vec<u8>, SchemeError>;
}

fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Each round's message includes the previous round's signature.
pub struct ChainedScheme;

impl Scheme for ChainedScheme {
    fn name(&self) -> SchemeName {
        SchemeName::Chained
    }

    fn digest(&self, round: u64, previous_signature: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(previous_signature.len() + 8);
        buf.extend_from_slice(previous_signature);
        buf.extend_from_slice(&round.to_be_bytes());
        sha256(&buf)
    }

    fn sign(&self, private_share: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError> {
        bls::sign_g2(private_share, message)
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, SchemeError> {
        bls::verify_g2(public_key, message, signature)
    }

    fn aggregate(&self, partials: &[(u32, Vec<u8>)]) -> Result<Vec<u8>, SchemeError> {
        bls::recover_g2(partials)
    }
}

/// Each round's message depends only on the round number.
pub struct UnchainedScheme;

impl Scheme for UnchainedScheme {
    fn name(&self) -> SchemeName {
        SchemeName::Unchained
    }

    fn digest(&self, round: u64, _previous_signature: &[u8]) -> Vec<u8> {
        sha256(&round.to_be_bytes())
    }

    fn sign(&self, private_share: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError> {
        bls::sign_g2(private_share, message)
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, SchemeError> {
        bls::verify_g2(public_key, message, signature)
    }

    fn aggregate(&self, partials: &[(u32, Vec<u8>)]) -> Result<Vec<u8>, SchemeError> {
        bls::recover_g2(partials)
    }
}

/// Unchained digest, but the signature lives on G1 and the public key on
/// G2 (smaller per-round signatures, larger group keys).
pub struct UnchainedOnG1Scheme;

impl Scheme for UnchainedOnG1Scheme {
    fn name(&self) -> SchemeName {
        SchemeName::SigOnG1Swapped
    }

    fn digest(&self, round: u64, _previous_signature: &[u8]) -> Vec<u8> {
        sha256(&round.to_be_bytes())
    }

    fn sign(&self, private_share: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError> {
        bls::sign_g1(private_share, message)
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, SchemeError> {
        bls::verify_g1(public_key, message, signature)
    }

    fn aggregate(&self, partials: &[(u32, Vec<u8>)]) -> Result<Vec<u8>, SchemeError> {
        bls::recover_g1(partials)
    }
}

/// Lets a `Box<dyn Scheme>` stand in anywhere a concrete `S: Scheme` is
/// expected, so code generic over `Scheme` (e.g. `BeaconProcess<S>`)
/// can also be instantiated at the scheme chosen at runtime from a
/// group file via `from_name`.
impl Scheme for Box<dyn Scheme> {
    fn name(&self) -> SchemeName {
        (**self).name()
    }

    fn digest(&self, round: u64, previous_signature: &[u8]) -> Vec<u8> {
        (**self).digest(round, previous_signature)
    }

    fn sign(&self, private_share: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError> {
        (**self).sign(private_share, message)
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, SchemeError> {
        (**self).verify(public_key, message, signature)
    }

    fn aggregate(&self, partials: &[(u32, Vec<u8>)]) -> Result<Vec<u8>, SchemeError> {
        (**self).aggregate(partials)
    }
}

/// Construct the `Scheme` implementation named by a group file / chain info.
pub fn from_name(name: SchemeName) -> Box<dyn Scheme> {
    match name {
        SchemeName::Chained => Box::new(ChainedScheme),
        SchemeName::Unchained => Box::new(UnchainedScheme),
        SchemeName::SigOnG1Swapped => Box::new(UnchainedOnG1Scheme),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_digest_depends_on_previous_signature() {
        let scheme = ChainedScheme;
        let a = scheme.digest(5, b"prev-a");
        let b = scheme.digest(5, b"prev-b");
        assert_ne!(a, b);
    }

    #[test]
    fn unchained_digest_ignores_previous_signature() {
        let scheme = UnchainedScheme;
        let a = scheme.digest(5, b"prev-a");
        let b = scheme.digest(5, b"prev-b");
        assert_eq!(a, b);
    }

    #[test]
    fn from_name_round_trips_scheme_identity() {
        assert_eq!(from_name(SchemeName::Chained).name(), SchemeName::Chained);
        assert_eq!(from_name(SchemeName::Unchained).name(), SchemeName::Unchained);
        assert_eq!(
            from_name(SchemeName::SigOnG1Swapped).name(),
            SchemeName::SigOnG1Swapped
        );
    }
}
