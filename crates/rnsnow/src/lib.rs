//! Reticulum over ESP-NOW.
//!
//! rnsnow bridges a serial link carrying Reticulum packets to a short-range,
//! MTU-limited broadcast radio. Packets are HDLC-framed on the wire, split
//! into radio-sized fragments, and rebuilt on the far side.
//!
//! # Crate Structure
//!
//! - [`transport`]: radio and serial interfaces plus host and in-memory implementations
//! - [`frame`]: link framing, fragmentation, reassembly and control payloads
//! - [`bridge`]: the bridge orchestrator, channel scanner and configuration

/// Re-export transport types.
pub mod transport {
    pub use rnsnow_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rnsnow_frame::*;
}

/// Re-export bridge types.
pub mod bridge {
    pub use rnsnow_bridge::*;
}
