//! Nibble packing for multi-byte numeric fields.
//!
//! Every transmitted byte carries at most four significant bits, high nibble
//! first, so a value like tempo 120 (0x78) travels as `07 08`.

/// Split `value` across `len` bytes, four bits each, most significant first.
///
/// Returns `None` if the value does not fit.
pub fn pack_nibbles(value: u32, len: usize) -> Option<Vec<u8>> {
    if len == 0 || (len < 8 && value >> (4 * len) != 0) {
        return None;
    }
    Some(
        (0..len)
            .rev()
            .map(|i| (value.checked_shr(4 * i as u32).unwrap_or(0) & 0x0F) as u8)
            .collect(),
    )
}

/// Recombine nibble bytes: `(b0 << 4) + b1` for a two-byte field.
///
/// Bytes are added whole, so a device sending more than four bits in a byte
/// carries into the next nibble.
pub fn unpack_nibbles(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 4).wrapping_add(u32::from(b)))
}
