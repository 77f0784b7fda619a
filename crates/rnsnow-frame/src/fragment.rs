use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Fragment header: control (1) + packet id (2) + sequence (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Control bit: first fragment of a message.
pub const FLAG_FIRST: u8 = 0x80;

/// Control bit: last fragment of a message.
pub const FLAG_LAST: u8 = 0x40;

/// Control bits that must be clear. Keeps every header-bearing fragment out
/// of the link-frame marker's value.
pub const RESERVED_MASK: u8 = !(FLAG_FIRST | FLAG_LAST);

/// ESP-NOW transmission unit.
pub const DEFAULT_RADIO_MTU: usize = 250;

/// Headroom kept free in every fragment on top of the header.
pub const DEFAULT_FRAGMENT_MARGIN: usize = 10;

/// Default ceiling on fragments per message.
pub const DEFAULT_MAX_FRAGMENTS: usize = 16;

/// Hard ceiling imposed by the 8-bit sequence number.
pub const MAX_FRAGMENTS_LIMIT: usize = 256;

/// Decoded fragment header.
///
/// Wire format:
/// ```text
/// ┌─────────────┬───────────────┬──────────┬──────────────┐
/// │ Control     │ Packet id     │ Sequence │ Chunk        │
/// │ F L 000000  │ (2B BE)       │ (1B)     │              │
/// └─────────────┴───────────────┴──────────┴──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub control: u8,
    pub packet_id: u16,
    pub sequence: u8,
}

impl FragmentHeader {
    pub fn new(packet_id: u16, sequence: u8, first: bool, last: bool) -> Self {
        let mut control = 0u8;
        if first {
            control |= FLAG_FIRST;
        }
        if last {
            control |= FLAG_LAST;
        }
        Self {
            control,
            packet_id,
            sequence,
        }
    }

    #[inline]
    pub fn is_first(&self) -> bool {
        self.control & FLAG_FIRST != 0
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.control & FLAG_LAST != 0
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.control);
        dst.put_u16(self.packet_id);
        dst.put_u8(self.sequence);
    }

    /// Split a raw fragment into header and chunk, validating the control byte.
    pub fn decode(raw: &[u8]) -> Result<(Self, &[u8])> {
        if raw.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: raw.len(),
                header: HEADER_SIZE,
            });
        }

        let control = raw[0];
        if control & RESERVED_MASK != 0 {
            return Err(FrameError::InvalidControl(control));
        }

        let header = Self {
            control,
            packet_id: u16::from_be_bytes([raw[1], raw[2]]),
            sequence: raw[3],
        };
        if header.is_first() != (header.sequence == 0) {
            return Err(FrameError::InconsistentSequence(header.sequence));
        }

        Ok((header, &raw[HEADER_SIZE..]))
    }
}

/// Fragmentation tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentConfig {
    /// Radio transmission unit.
    pub mtu: usize,
    /// Bytes kept free in every fragment beyond the header.
    pub margin: usize,
    /// Most fragments one message may use.
    pub max_fragments: usize,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_RADIO_MTU,
            margin: DEFAULT_FRAGMENT_MARGIN,
            max_fragments: DEFAULT_MAX_FRAGMENTS,
        }
    }
}

impl FragmentConfig {
    /// Largest payload chunk carried by one fragment.
    pub fn chunk_size(&self) -> usize {
        self.mtu.saturating_sub(HEADER_SIZE + self.margin)
    }

    pub fn validate(&self) -> Result<()> {
        let min = HEADER_SIZE + self.margin + 1;
        if self.mtu < min {
            return Err(FrameError::MtuTooSmall { mtu: self.mtu, min });
        }
        if self.max_fragments == 0 || self.max_fragments > MAX_FRAGMENTS_LIMIT {
            return Err(FrameError::InvalidFragmentLimit(self.max_fragments));
        }
        Ok(())
    }

    /// Radio sends needed for a payload of `len` bytes.
    pub fn fragments_needed(&self, len: usize) -> usize {
        if len <= self.mtu {
            1
        } else {
            len.div_ceil(self.chunk_size())
        }
    }
}

/// Splits framed payloads into radio-sized fragments.
#[derive(Debug)]
pub struct Fragmenter {
    config: FragmentConfig,
    packet_id: u16,
}

impl Fragmenter {
    pub fn new(config: FragmentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            packet_id: 0,
        })
    }

    pub fn config(&self) -> &FragmentConfig {
        &self.config
    }

    /// Identifier given to the most recent fragmented message.
    pub fn last_packet_id(&self) -> u16 {
        self.packet_id
    }

    /// Split `data` into the radio sends that carry it.
    ///
    /// Payloads that fit the MTU go out unchanged as a single piece; callers
    /// only pass complete link frames, which receivers recognise by their
    /// markers. Larger payloads get a fresh packet id and one header per
    /// chunk. A payload that would exceed the fragment ceiling is rejected
    /// before any id is consumed.
    pub fn fragment(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        if data.len() <= self.config.mtu {
            return Ok(vec![Bytes::copy_from_slice(data)]);
        }

        let chunk_size = self.config.chunk_size();
        let needed = data.len().div_ceil(chunk_size);
        if needed > self.config.max_fragments {
            return Err(FrameError::TooManyFragments {
                size: data.len(),
                needed,
                max: self.config.max_fragments,
            });
        }

        self.packet_id = self.packet_id.wrapping_add(1);
        let last = needed - 1;
        let fragments = data
            .chunks(chunk_size)
            .enumerate()
            .map(|(sequence, chunk)| {
                let header =
                    FragmentHeader::new(self.packet_id, sequence as u8, sequence == 0, sequence == last);
                let mut buf = BytesMut::with_capacity(HEADER_SIZE + chunk.len());
                header.encode(&mut buf);
                buf.put_slice(chunk);
                buf.freeze()
            })
            .collect::<Vec<_>>();

        trace!(
            packet_id = self.packet_id,
            size = data.len(),
            fragments = fragments.len(),
            "payload fragmented"
        );
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FLAG;

    fn fragmenter() -> Fragmenter {
        Fragmenter::new(FragmentConfig::default()).unwrap()
    }

    #[test]
    fn small_payload_passes_through_unchanged() {
        let mut f = fragmenter();
        let data = vec![0x42; DEFAULT_RADIO_MTU];
        let out = f.fragment(&data).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref(), data.as_slice());
        assert_eq!(f.last_packet_id(), 0);
    }

    #[test]
    fn six_hundred_bytes_make_three_fragments() {
        let mut f = fragmenter();
        let data: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
        let out = f.fragment(&data).unwrap();

        let sizes: Vec<usize> = out.iter().map(|b| b.len() - HEADER_SIZE).collect();
        assert_eq!(sizes, vec![236, 236, 128]);

        for (i, raw) in out.iter().enumerate() {
            let (header, _) = FragmentHeader::decode(raw).unwrap();
            assert_eq!(header.sequence as usize, i);
            assert_eq!(header.packet_id, 1);
            assert_eq!(header.is_first(), i == 0);
            assert_eq!(header.is_last(), i == 2);
            assert!(raw.len() <= DEFAULT_RADIO_MTU);
        }
    }

    #[test]
    fn packet_id_increments_and_wraps() {
        let mut f = fragmenter();
        f.packet_id = u16::MAX - 1;
        let data = vec![0u8; 300];

        f.fragment(&data).unwrap();
        assert_eq!(f.last_packet_id(), u16::MAX);
        let out = f.fragment(&data).unwrap();
        assert_eq!(f.last_packet_id(), 0);
        assert_eq!(FragmentHeader::decode(&out[0]).unwrap().0.packet_id, 0);
    }

    #[test]
    fn over_ceiling_rejected_without_consuming_id() {
        let config = FragmentConfig {
            max_fragments: 2,
            ..FragmentConfig::default()
        };
        let mut f = Fragmenter::new(config).unwrap();
        let err = f.fragment(&[0u8; 600]).unwrap_err();
        assert_eq!(
            err,
            FrameError::TooManyFragments {
                size: 600,
                needed: 3,
                max: 2
            }
        );
        assert_eq!(f.last_packet_id(), 0);
    }

    #[test]
    fn header_never_collides_with_marker() {
        for control in [0u8, FLAG_FIRST, FLAG_LAST, FLAG_FIRST | FLAG_LAST] {
            assert_ne!(control, FLAG);
            assert_eq!(control & RESERVED_MASK, 0);
        }
    }

    #[test]
    fn decode_rejects_malformed_headers() {
        assert_eq!(
            FragmentHeader::decode(&[FLAG_FIRST, 0, 1]).unwrap_err(),
            FrameError::Truncated { len: 3, header: 4 }
        );
        assert_eq!(
            FragmentHeader::decode(&[FLAG, 0, 1, 0, 9]).unwrap_err(),
            FrameError::InvalidControl(FLAG)
        );
        assert_eq!(
            FragmentHeader::decode(&[FLAG_FIRST, 0, 1, 2]).unwrap_err(),
            FrameError::InconsistentSequence(2)
        );
        assert_eq!(
            FragmentHeader::decode(&[0, 0, 1, 0]).unwrap_err(),
            FrameError::InconsistentSequence(0)
        );
    }

    #[test]
    fn config_validation() {
        let tiny = FragmentConfig {
            mtu: 14,
            ..FragmentConfig::default()
        };
        assert!(matches!(
            Fragmenter::new(tiny),
            Err(FrameError::MtuTooSmall { mtu: 14, min: 15 })
        ));

        let unbounded = FragmentConfig {
            max_fragments: 257,
            ..FragmentConfig::default()
        };
        assert!(matches!(
            unbounded.validate(),
            Err(FrameError::InvalidFragmentLimit(257))
        ));

        let config = FragmentConfig::default();
        assert_eq!(config.chunk_size(), 236);
        assert_eq!(config.fragments_needed(250), 1);
        assert_eq!(config.fragments_needed(600), 3);
    }
}
