//! CRC-32 integrity checks for stored payloads.

use crate::util::{Error, Result};

/// Compute the CRC-32 (IEEE) of `data`.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verify that `data` hashes to `expected`.
pub fn verify_crc32(data: &[u8], expected: u32) -> Result<()> {
    let actual = crc32(data);
    if actual != expected {
        return Err(Error::consistency(format!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            expected, actual
        )));
    }
    Ok(())
}
