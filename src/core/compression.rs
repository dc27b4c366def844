//! Compression strategies for frame payloads.
//!
//! The container treats the compressor as an opaque strategy: the writer
//! only needs a pure `compress`/`decompress` pair. The default strategy is
//! zlib via flate2.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Default zlib level used by [`ZlibCompressor::default`].
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// A stateless byte compressor.
pub trait Compressor: Send + Sync {
    /// Short identifier, recorded in the file tags.
    fn name(&self) -> &str;

    /// Compress `data`.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `data`, which must expand to exactly `expected_len` bytes.
    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

/// zlib compressor backed by flate2.
#[derive(Clone, Copy, Debug)]
pub struct ZlibCompressor {
    level: u32,
}

impl ZlibCompressor {
    /// Create a compressor with the given level (0-9, clamped).
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }

    /// Get the compression level.
    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Compressor for ZlibCompressor {
    fn name(&self) -> &str {
        "zlib"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(self.level));
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::with_capacity(expected_len);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::consistency(format!("zlib stream is corrupt: {}", e)))?;
        if out.len() != expected_len {
            return Err(Error::consistency(format!(
                "decompressed {} bytes, expected {}",
                out.len(),
                expected_len
            )));
        }
        Ok(out)
    }
}

/// Compress `data`, falling back to the input when compression does not help.
///
/// Returns the bytes to store and whether they are compressed.
pub fn compress_if_smaller(compressor: &dyn Compressor, data: &[u8]) -> Result<(Vec<u8>, bool)> {
    if data.is_empty() {
        return Ok((Vec::new(), false));
    }
    let compressed = compressor.compress(data)?;
    if compressed.len() >= data.len() {
        return Ok((data.to_vec(), false));
    }
    Ok((compressed, true))
}
