use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::codec::{ESC, ESC_MASK, FLAG};

/// Default cap on a decoded frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2048;

/// Byte-at-a-time link frame decoder.
///
/// Feed it a live serial stream; it yields each unescaped payload when the
/// closing marker arrives. Bytes outside a frame are ignored, so the decoder
/// resynchronizes on the next marker after any corruption.
#[derive(Debug)]
pub struct HdlcDecoder {
    buf: BytesMut,
    in_frame: bool,
    escape: bool,
    max_frame_size: usize,
    overflows: u64,
}

impl Default for HdlcDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HdlcDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_frame_size.min(DEFAULT_MAX_FRAME_SIZE)),
            in_frame: false,
            escape: false,
            max_frame_size,
            overflows: 0,
        }
    }

    /// Consume one byte; returns a payload when a frame closes.
    ///
    /// A marker with an empty buffer (re)starts capture instead of emitting
    /// an empty frame.
    pub fn decode_byte(&mut self, byte: u8) -> Option<Bytes> {
        if byte == FLAG {
            if self.in_frame && !self.buf.is_empty() {
                self.in_frame = false;
                self.escape = false;
                return Some(self.buf.split().freeze());
            }
            self.buf.clear();
            self.in_frame = true;
            self.escape = false;
            return None;
        }

        if !self.in_frame {
            return None;
        }

        if byte == ESC {
            self.escape = true;
            return None;
        }

        let byte = if self.escape {
            self.escape = false;
            unescape(byte)
        } else {
            byte
        };

        if self.buf.len() >= self.max_frame_size {
            warn!(
                max = self.max_frame_size,
                "link frame exceeds maximum size, discarding"
            );
            self.overflows += 1;
            self.reset();
            return None;
        }

        self.buf.put_u8(byte);
        None
    }

    /// Consume a chunk, collecting every frame it closes.
    pub fn decode(&mut self, data: &[u8]) -> Vec<Bytes> {
        data.iter().filter_map(|b| self.decode_byte(*b)).collect()
    }

    /// Drop any partial frame and leave frame mode.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_frame = false;
        self.escape = false;
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Bytes of the frame currently being captured.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Frames discarded for exceeding the size cap.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

fn unescape(byte: u8) -> u8 {
    if byte == FLAG ^ ESC_MASK {
        FLAG
    } else if byte == ESC ^ ESC_MASK {
        ESC
    } else {
        byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::frame;

    fn feed(decoder: &mut HdlcDecoder, wire: &[u8]) -> Vec<Bytes> {
        wire.iter().filter_map(|b| decoder.decode_byte(*b)).collect()
    }

    #[test]
    fn round_trip_plain() {
        let mut decoder = HdlcDecoder::new();
        let frames = feed(&mut decoder, &frame(b"reticulum"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"reticulum");
        assert!(!decoder.in_frame());
    }

    #[test]
    fn round_trip_every_byte_value() {
        let payload: Vec<u8> = (0..=255u8).chain(0..=255u8).collect();
        let mut decoder = HdlcDecoder::new();
        let frames = feed(&mut decoder, &frame(&payload));
        assert_eq!(frames, vec![Bytes::from(payload)]);
    }

    #[test]
    fn round_trip_special_bytes_only() {
        let payload = [FLAG, ESC, FLAG, FLAG, ESC, ESC];
        let mut decoder = HdlcDecoder::new();
        let frames = feed(&mut decoder, &frame(&payload));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &payload);
    }

    #[test]
    fn consecutive_markers_never_emit_empty_frame() {
        let mut decoder = HdlcDecoder::new();
        assert!(feed(&mut decoder, &[FLAG, FLAG, FLAG]).is_empty());
        assert!(decoder.in_frame());

        let frames = feed(&mut decoder, b"abc\x7e");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"abc");
    }

    #[test]
    fn noise_outside_frame_is_ignored() {
        let mut decoder = HdlcDecoder::new();
        let mut wire = b"garbage\x7d\x20".to_vec();
        wire.extend_from_slice(&frame(b"clean"));
        let frames = feed(&mut decoder, &wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"clean");
    }

    #[test]
    fn marker_after_close_starts_fresh_frame() {
        let mut decoder = HdlcDecoder::new();
        let mut wire = frame(b"one").to_vec();
        wire.extend_from_slice(&frame(b"two"));
        let frames = feed(&mut decoder, &wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), b"one");
        assert_eq!(frames[1].as_ref(), b"two");
    }

    #[test]
    fn marker_after_dangling_escape_still_closes() {
        let mut decoder = HdlcDecoder::new();
        let frames = feed(&mut decoder, &[FLAG, b'a', ESC, FLAG]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"a");
    }

    #[test]
    fn unknown_escape_passes_byte_through() {
        let mut decoder = HdlcDecoder::new();
        let frames = feed(&mut decoder, &[FLAG, b'a', ESC, b'b', FLAG]);
        assert_eq!(frames[0].as_ref(), b"ab");
    }

    #[test]
    fn oversized_frame_is_discarded() {
        let mut decoder = HdlcDecoder::with_max_frame_size(8);
        let frames = feed(&mut decoder, b"\x7e0123456789\x7e");
        assert!(frames.is_empty());
        assert_eq!(decoder.overflows(), 1);

        let frames = feed(&mut decoder, &frame(b"small"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"small");
    }

    #[test]
    fn frame_at_exact_cap_is_kept() {
        let mut decoder = HdlcDecoder::with_max_frame_size(4);
        let frames = decoder.decode(&frame(b"four"));
        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.overflows(), 0);
    }

    #[test]
    fn split_across_chunks() {
        let wire = frame(&[1, FLAG, 2, ESC, 3]);
        let mut decoder = HdlcDecoder::new();
        let (head, tail) = wire.split_at(3);
        assert!(decoder.decode(head).is_empty());
        assert_eq!(decoder.buffered(), 1);
        let frames = decoder.decode(tail);
        assert_eq!(frames[0].as_ref(), &[1, FLAG, 2, ESC, 3]);
    }
}
