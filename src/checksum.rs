//! CRC-32C frame checksum
//!
//! the same checksum covers the call frame, the reply frame and the
//! publish frame
use crc32c::crc32c;

/// compute the 32-bit checksum of the bytes
#[inline]
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32c(bytes)
}

/// check the bytes against a received checksum
#[inline]
pub fn verify(bytes: &[u8], expected: u32) -> bool {
    checksum(bytes) == expected
}
