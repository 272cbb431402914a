use thiserror::Error;

/// Error taxonomy shared by every `ChainStore` backend (§4.B, §7).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no beacon stored")]
    NoBeaconStored,
    #[error("beacon already stored at round {0}")]
    BeaconAlreadyStored(u64),
    #[error("conflicting beacon at round {0}: a different signature is already stored")]
    ConflictingBeacon(u64),
    #[error("round {round} requires round {round}-1 to be present first")]
    MissingPrevious { round: u64 },
    #[error("backend error: {0}")]
    Backend(String),
}
