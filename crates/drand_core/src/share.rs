//! This node's private key share (§3, §4.H).

/// This node's secret key share plus its index within the current group.
/// Owned by the `BeaconProcess`; replaced wholesale (never mutated) on a
/// DKG transition.
#[derive(Clone)]
pub struct Share {
    pub index: u32,
    pub private: Vec<u8>,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("private", &"<redacted>")
            .finish()
    }
}
