//! 7-bit device memory addresses.
//!
//! Roland instruments address their parameter memory with four bytes, each
//! carrying seven significant bits. `01 00 10 00` is therefore not the integer
//! `0x01001000` in arithmetic terms: adding `0x80` to `00 00 00 7F` carries
//! into the third byte. [`Address`] keeps the packed form for display and
//! equality and converts to a linear offset for arithmetic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest linear value representable by four 7-bit bytes.
pub const MAX_LINEAR: u32 = (1 << 28) - 1;

/// Packed 4-byte 7-bit address (`aa bb cc dd` stored as `0xaabbccdd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(u32);

impl Address {
    /// Build from the four address bytes as they appear on the wire.
    ///
    /// The top bit of each byte is discarded.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes([
            bytes[0] & 0x7F,
            bytes[1] & 0x7F,
            bytes[2] & 0x7F,
            bytes[3] & 0x7F,
        ]))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Packed representation (`0xaabbccdd`).
    pub const fn packed(self) -> u32 {
        self.0
    }

    /// Convert a linear offset (`0..=MAX_LINEAR`) to a packed address.
    pub fn from_linear(linear: u32) -> Option<Self> {
        if linear > MAX_LINEAR {
            return None;
        }
        Some(Self::from_bytes([
            ((linear >> 21) & 0x7F) as u8,
            ((linear >> 14) & 0x7F) as u8,
            ((linear >> 7) & 0x7F) as u8,
            (linear & 0x7F) as u8,
        ]))
    }

    pub fn to_linear(self) -> u32 {
        let [a, b, c, d] = self.to_bytes();
        ((a as u32) << 21) | ((b as u32) << 14) | ((c as u32) << 7) | d as u32
    }

    /// Address `offset` bytes after this one, with 7-bit carry.
    pub fn offset(self, offset: u32) -> Option<Self> {
        self.to_linear()
            .checked_add(offset)
            .and_then(Self::from_linear)
    }

    /// Distance from `base` to this address, if this address is not below it.
    pub fn offset_from(self, base: Address) -> Option<u32> {
        self.to_linear().checked_sub(base.to_linear())
    }
}

impl From<[u8; 4]> for Address {
    fn from(bytes: [u8; 4]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.to_bytes();
        write!(f, "{:02X} {:02X} {:02X} {:02X}", a, b, c, d)
    }
}

/// Encode a byte count the way RQ1 expects it (four 7-bit bytes).
pub fn encode_size(length: u32) -> Option<[u8; 4]> {
    Address::from_linear(length).map(Address::to_bytes)
}

/// Decode a 4-byte 7-bit size field.
pub fn decode_size(bytes: [u8; 4]) -> u32 {
    Address::from_bytes(bytes).to_linear()
}
