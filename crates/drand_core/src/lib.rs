//! Data model and cryptography for a drand-style randomness beacon node:
//! beacons, groups, shares, round arithmetic, chain identity, and the
//! threshold BLS schemes that tie them together.

pub mod beacon;
pub mod bls;
pub mod chain_hash;
pub mod clock;
pub mod error;
pub mod group;
pub mod scheme;
pub mod share;

pub use beacon::{Beacon, BeaconJson, PartialBeaconPacket, PartialSignature};
pub use chain_hash::chain_hash;
pub use clock::{current_round, next_round, time_of_round};
pub use error::{ClockError, GroupError, SchemeError};
pub use group::{Group, Node, SchemeName, DEFAULT_BEACON_ID};
pub use scheme::Scheme;
pub use share::Share;
