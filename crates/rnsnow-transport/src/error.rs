use std::net::SocketAddr;
use std::path::PathBuf;

use crate::address::PeerAddress;

/// Errors that can occur in radio or serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the emulated radio socket.
    #[error("failed to bind radio socket to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to open the serial device.
    #[error("failed to open serial device {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload exceeds the radio transmission unit.
    #[error("payload too large for radio ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel is outside the legal radio range.
    #[error("invalid radio channel {0}")]
    InvalidChannel(u8),

    /// A unicast send targeted a peer that was never registered.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerAddress),

    /// A peer address string could not be parsed.
    #[error("invalid peer address: {0}")]
    InvalidAddress(String),

    /// The serial port has not been opened yet.
    #[error("serial port not open")]
    NotOpen,

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
