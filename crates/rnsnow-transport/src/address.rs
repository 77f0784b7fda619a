use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TransportError;

/// The radio broadcast address.
pub const BROADCAST: PeerAddress = PeerAddress([0xFF; 6]);

/// A 6-byte radio station address.
///
/// Parsed from and rendered as 12 hex digits, with or without `:`
/// separators (`ffffffffffff`, `aa:bb:cc:dd:ee:ff`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress([u8; 6]);

impl PeerAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == BROADCAST
    }

    /// Build an address from a slice that must be exactly six bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Compact lowercase hex form without separators, as stored in config files.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl Default for PeerAddress {
    fn default() -> Self {
        BROADCAST
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for PeerAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if hex.len() != 12 || !hex.is_ascii() {
            return Err(TransportError::InvalidAddress(s.to_string()));
        }

        let mut out = [0u8; 6];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| TransportError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(out))
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_and_separated_forms() {
        let compact: PeerAddress = "a0b1c2d3e4f5".parse().unwrap();
        let separated: PeerAddress = "A0:B1:C2:D3:E4:F5".parse().unwrap();
        assert_eq!(compact, separated);
        assert_eq!(compact.as_bytes(), &[0xA0, 0xB1, 0xC2, 0xD3, 0xE4, 0xF5]);
    }

    #[test]
    fn rejects_bad_lengths_and_digits() {
        assert!("ffff".parse::<PeerAddress>().is_err());
        assert!("zzzzzzzzzzzz".parse::<PeerAddress>().is_err());
        assert!("ffffffffffffff".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn display_and_hex_forms() {
        let addr = PeerAddress::new([0x01, 0x02, 0x03, 0x04, 0x05, 0xff]);
        assert_eq!(addr.to_string(), "01:02:03:04:05:ff");
        assert_eq!(addr.to_hex(), "0102030405ff");
    }

    #[test]
    fn default_is_broadcast() {
        assert!(PeerAddress::default().is_broadcast());
        assert!(!PeerAddress::new([0; 6]).is_broadcast());
    }
}
