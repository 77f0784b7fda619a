//! Reserved control payloads and inbound radio classification.
//!
//! Every control payload starts with the protocol group id, so only devices
//! speaking a compatible protocol version react to each other.

use crate::codec::is_framed;

/// Protocol/group identifier shared by all control payloads.
pub const GROUP_ID: &[u8] = b"RNS09";

/// Presence ping. Gives local feedback, never forwarded.
pub const PING: &[u8] = b"RNS09PING";

/// Channel probe, answered with [`PROBE_ACK`].
pub const PROBE: &[u8] = b"RNS09PROBE";

/// Channel probe acknowledgement.
pub const PROBE_ACK: &[u8] = b"RNS09ACK";

/// What an inbound radio payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Ping,
    Probe,
    ProbeAck,
    /// A complete link frame; forward verbatim.
    Frame(&'a [u8]),
    /// Anything else goes to reassembly.
    Fragment(&'a [u8]),
    Empty,
}

impl Inbound<'_> {
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping | Self::Probe | Self::ProbeAck)
    }
}

pub fn classify(data: &[u8]) -> Inbound<'_> {
    match data {
        [] => Inbound::Empty,
        PING => Inbound::Ping,
        PROBE => Inbound::Probe,
        PROBE_ACK => Inbound::ProbeAck,
        _ if is_framed(data) => Inbound::Frame(data),
        _ => Inbound::Fragment(data),
    }
}
