//! Radio and serial transport abstraction for the rnsnow bridge.
//!
//! The bridge core never talks to hardware directly. It consumes two narrow
//! interfaces defined here:
//! - [`RadioTransport`]: an unreliable, unordered, MTU-bounded broadcast medium
//!   (ESP-NOW class)
//! - [`SerialPort`]: a byte-transparent wired link with non-blocking reads
//!
//! Concrete implementations are provided for running on a host ([`UdpRadio`],
//! [`StreamSerial`]) and for tests ([`MemoryMedium`], [`MemorySerial`]).

pub mod address;
pub mod error;
pub mod memory;
pub mod serial;
pub mod traits;
pub mod udp;

pub use address::{PeerAddress, BROADCAST};
pub use error::{Result, TransportError};
pub use memory::{MemoryMedium, MemoryRadio, MemorySerial, SerialHost, Transmission};
pub use serial::{SerialDevice, StreamSerial};
pub use traits::{RadioProtocol, RadioTransport, SerialPort, ESPNOW_MTU, MAX_CHANNEL, MIN_CHANNEL};
pub use udp::{UdpRadio, UdpRadioConfig};
