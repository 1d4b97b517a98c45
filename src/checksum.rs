//! Single-byte integrity code for thrustbus frames.
//!
//! The code is a rotating sum: before each byte is added, the accumulator is
//! rotated right by one bit with the low bit carried into bit 15. The
//! accumulator is trimmed to a single byte after every step, so the value is
//! order dependent (swapping two bytes changes the result) but always fits the
//! one-byte frame trailer.

/// Fold one byte into the running accumulator.
#[inline]
fn fold(acc: u16, byte: u8) -> u16 {
    let rotated = (acc >> 1) | ((acc & 1) << 15);
    rotated.wrapping_add(u16::from(byte)) & 0x00FF
}

/// Compute the checksum of `bytes` in transmission order.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u16, |acc, &b| fold(acc, b)) as u8
}

/// Check that the last byte of `frame` is the checksum of everything before it.
///
/// Returns `false` for an empty slice.
pub fn verify(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&trailer, body)) => checksum(body) == trailer,
        None => false,
    }
}
