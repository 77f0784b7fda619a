//! Link framing and radio fragmentation for the rnsnow bridge.
//!
//! Two layers sit between the serial stream and the radio:
//! - HDLC-style framing: `0x7E` boundary markers with `0x7D` escaping, so any
//!   binary payload crosses the byte stream unambiguously ([`codec`],
//!   [`decoder`])
//! - fragmentation: frames larger than the radio MTU travel as numbered
//!   fragments with a 4-byte header and are rebuilt in any arrival order
//!   ([`fragment`], [`reassembly`])
//!
//! [`control`] holds the reserved ping/probe payloads and the classifier the
//! receive path uses to tell them apart from data.

pub mod codec;
pub mod control;
pub mod decoder;
pub mod error;
pub mod fragment;
pub mod reassembly;

pub use codec::{encode_frame, encoded_len, frame, is_framed, ESC, ESC_MASK, FLAG};
pub use control::{classify, Inbound, GROUP_ID, PING, PROBE, PROBE_ACK};
pub use decoder::{HdlcDecoder, DEFAULT_MAX_FRAME_SIZE};
pub use error::{FrameError, Result};
pub use fragment::{
    FragmentConfig, FragmentHeader, Fragmenter, DEFAULT_FRAGMENT_MARGIN, DEFAULT_MAX_FRAGMENTS,
    DEFAULT_RADIO_MTU, FLAG_FIRST, FLAG_LAST, HEADER_SIZE, MAX_FRAGMENTS_LIMIT,
};
pub use reassembly::{
    ReassemblyConfig, ReassemblyStats, Reassembler, DEFAULT_MAX_PENDING,
    DEFAULT_REASSEMBLY_TIMEOUT,
};
