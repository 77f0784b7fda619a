use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;
use crate::error::Result;

/// ESP-NOW maximum payload per send call.
pub const ESPNOW_MTU: usize = 250;

/// Lowest legal 2.4 GHz channel.
pub const MIN_CHANNEL: u8 = 1;

/// Highest 2.4 GHz channel any region allows.
pub const MAX_CHANNEL: u8 = 14;

/// Radio PHY mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioProtocol {
    /// Standard 802.11 b/g/n rates.
    #[default]
    Default,
    /// Long-range low-rate mode.
    Lr,
}

/// A broadcast-capable, MTU-bounded radio link.
///
/// The medium is unreliable and unordered. Any payload handed to
/// [`send`](RadioTransport::send) must already fit in [`mtu`](RadioTransport::mtu).
pub trait RadioTransport: Send + Sync {
    /// Transmit one payload to `peer` (or the broadcast address).
    fn send(&self, peer: PeerAddress, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next payload addressed to this station.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    fn recv(&self) -> impl Future<Output = Result<(PeerAddress, Bytes)>> + Send;

    /// Tune the radio to `channel`.
    fn set_channel(&self, channel: u8) -> Result<()>;

    /// The channel the radio is currently tuned to.
    fn channel(&self) -> u8;

    /// Register a peer so unicast sends to it are accepted.
    fn add_peer(&self, peer: PeerAddress) -> Result<()>;

    /// Maximum payload per [`send`](RadioTransport::send) call.
    fn mtu(&self) -> usize {
        ESPNOW_MTU
    }
}

/// A byte-transparent wired link.
pub trait SerialPort: Send + Sync {
    /// Open (or re-open) the underlying device.
    fn open(&self) -> Result<()>;

    /// Whether the port is currently usable.
    fn is_open(&self) -> bool;

    /// Non-blocking read of everything currently buffered.
    ///
    /// Returns `Ok(None)` when no bytes are available.
    fn read(&self) -> Result<Option<Bytes>>;

    /// Write a block of bytes in full.
    fn write(&self, data: &[u8]) -> Result<()>;
}

pub(crate) fn check_channel(channel: u8) -> Result<u8> {
    if (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
        Ok(channel)
    } else {
        Err(crate::error::TransportError::InvalidChannel(channel))
    }
}
