use bytes::{BufMut, Bytes, BytesMut};

/// Frame boundary marker.
pub const FLAG: u8 = 0x7E;

/// Escape byte.
pub const ESC: u8 = 0x7D;

/// XOR applied to an escaped byte.
pub const ESC_MASK: u8 = 0x20;

/// Escape `payload` into `dst` without boundary markers.
///
/// Every [`FLAG`] and [`ESC`] becomes `ESC, byte ^ ESC_MASK`; all other bytes
/// pass through unchanged.
pub fn escape_into(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len());
    for &byte in payload {
        if byte == FLAG || byte == ESC {
            dst.put_u8(ESC);
            dst.put_u8(byte ^ ESC_MASK);
        } else {
            dst.put_u8(byte);
        }
    }
}

/// Encode a payload into the link wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────────────────┬──────┐
/// │ 0x7E │ escaped payload      │ 0x7E │
/// └──────┴──────────────────────┴──────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(encoded_len(payload));
    dst.put_u8(FLAG);
    escape_into(payload, dst);
    dst.put_u8(FLAG);
}

/// Encode a payload into a fresh buffer.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    encode_frame(payload, &mut buf);
    buf.freeze()
}

/// Exact wire size of `payload` once framed.
pub fn encoded_len(payload: &[u8]) -> usize {
    let escaped = payload.iter().filter(|b| **b == FLAG || **b == ESC).count();
    payload.len() + escaped + 2
}

/// Whether `data` is already a complete link frame (marker at both ends).
pub fn is_framed(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == FLAG && data[data.len() - 1] == FLAG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_payload_is_wrapped() {
        let wire = frame(b"hello");
        assert_eq!(wire.as_ref(), b"\x7ehello\x7e");
        assert_eq!(encoded_len(b"hello"), wire.len());
    }

    #[test]
    fn marker_and_escape_are_escaped() {
        let wire = frame(&[0x01, FLAG, 0x02, ESC, 0x03]);
        assert_eq!(
            wire.as_ref(),
            &[FLAG, 0x01, ESC, 0x5E, 0x02, ESC, 0x5D, 0x03, FLAG]
        );
        assert_eq!(encoded_len(&[0x01, FLAG, 0x02, ESC, 0x03]), wire.len());
    }

    #[test]
    fn escaped_body_never_contains_marker() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let wire = frame(&payload);
        assert!(!wire[1..wire.len() - 1].contains(&FLAG));
    }

    #[test]
    fn empty_payload() {
        assert_eq!(frame(b"").as_ref(), &[FLAG, FLAG]);
    }

    #[test]
    fn framed_detection() {
        assert!(is_framed(b"\x7eabc\x7e"));
        assert!(is_framed(&[FLAG, FLAG]));
        assert!(!is_framed(&[FLAG]));
        assert!(!is_framed(b"\x7eabc"));
        assert!(!is_framed(&[0x80, 0x00, 0x01, 0x00, FLAG]));
        assert!(!is_framed(b""));
    }
}
