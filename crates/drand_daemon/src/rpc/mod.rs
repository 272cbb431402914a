//! The three gRPC surfaces a daemon exposes (§6): `Public` (anyone),
//! `Protocol` (group peers), `Control` (loopback admin only).

pub mod control;
pub mod protocol;
pub mod public;

pub use control::ControlService;
pub use protocol::ProtocolService;
pub use public::PublicService;
