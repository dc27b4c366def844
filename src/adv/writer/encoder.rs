//! Frame payload encoding.
//!
//! A payload is either the raw sample plane (keyframe) or a delta against a
//! baseline frame: a magnitude plane `|current - baseline|` at the layout's
//! sample width, followed by a bit-packed sign plane (bit set when the
//! current sample is below the baseline). The encoded bytes are optionally
//! compressed, and the CRC-32 is taken over the bytes actually stored.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::layout::{CompressionMode, ImageEncoding, ImageLayout};
use crate::core::{compress_if_smaller, crc32, verify_crc32, Compressor};
use crate::util::{Error, Result};

/// Whether a stored image stands alone or refers to a baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Keyframe,
    Delta,
}

impl FrameKind {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Keyframe => 0,
            Self::Delta => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Keyframe),
            1 => Some(Self::Delta),
            _ => None,
        }
    }
}

/// An encoded image as stored in a frame record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub layout_id: u8,
    pub kind: FrameKind,
    /// Whether `payload` went through the compressor.
    pub compressed: bool,
    /// Length of the payload before compression.
    pub raw_len: u32,
    pub payload: Vec<u8>,
    /// CRC-32 of `payload`.
    pub checksum: u32,
}

impl EncodedImage {
    /// Recompute the checksum of the stored payload.
    pub fn verify(&self) -> Result<()> {
        verify_crc32(&self.payload, self.checksum)
    }

    /// Serialize the image part of a frame record.
    pub(crate) fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(self.layout_id)?;
        buf.write_u8(self.kind.to_u8())?;
        buf.write_u8(self.compressed as u8)?;
        buf.write_u32::<LittleEndian>(self.raw_len)?;
        buf.write_u32::<LittleEndian>(self.payload.len() as u32)?;
        buf.extend_from_slice(&self.payload);
        buf.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }

    /// Parse the image part of a frame record.
    pub(crate) fn parse(data: &[u8], pos: &mut usize) -> Result<Self> {
        let head = data
            .get(*pos..*pos + 11)
            .ok_or_else(|| Error::invalid("image header truncated"))?;
        let layout_id = head[0];
        let kind = FrameKind::from_u8(head[1])
            .ok_or_else(|| Error::invalid(format!("unknown frame kind {}", head[1])))?;
        let compressed = match head[2] {
            0 => false,
            1 => true,
            other => return Err(Error::invalid(format!("bad compression flag {}", other))),
        };
        let raw_len = LittleEndian::read_u32(&head[3..7]);
        let payload_len = LittleEndian::read_u32(&head[7..11]) as usize;
        *pos += 11;

        let payload = data
            .get(*pos..*pos + payload_len)
            .ok_or_else(|| Error::invalid("image payload truncated"))?
            .to_vec();
        *pos += payload_len;
        let checksum = data
            .get(*pos..*pos + 4)
            .map(LittleEndian::read_u32)
            .ok_or_else(|| Error::invalid("image checksum truncated"))?;
        *pos += 4;

        Ok(Self { layout_id, kind, compressed, raw_len, payload, checksum })
    }
}

/// Bring caller samples of depth `pixels_bpp` to the layout depth.
///
/// Deeper samples are shifted down; every resulting sample must fit the
/// layout's bit depth.
pub fn normalize_pixels(layout: &ImageLayout, pixels: &[u16], pixels_bpp: u8) -> Result<Vec<u16>> {
    if !(1..=16).contains(&pixels_bpp) {
        return Err(Error::config(format!("pixel depth {} not in 1..=16", pixels_bpp)));
    }
    if pixels.len() != layout.pixel_count() {
        return Err(Error::config(format!(
            "layout {} expects {} pixels, got {}",
            layout.id,
            layout.pixel_count(),
            pixels.len()
        )));
    }

    let shift = pixels_bpp.saturating_sub(layout.bpp);
    let max = layout.max_value();
    let mut out = Vec::with_capacity(pixels.len());
    for &p in pixels {
        let v = p >> shift;
        if v > max {
            return Err(Error::config(format!(
                "pixel value {} exceeds {}-bit layout {}",
                v, layout.bpp, layout.id
            )));
        }
        out.push(v);
    }
    Ok(out)
}

/// Pack samples at 1 or 2 bytes (little-endian) per sample.
pub fn pack_samples(pixels: &[u16], bytes_per_sample: usize) -> Vec<u8> {
    if bytes_per_sample == 1 {
        return pixels.iter().map(|&p| p as u8).collect();
    }
    let mut out = vec![0u8; pixels.len() * 2];
    LittleEndian::write_u16_into(pixels, &mut out);
    out
}

/// Unpack `count` samples at 1 or 2 bytes per sample.
pub fn unpack_samples(data: &[u8], bytes_per_sample: usize, count: usize) -> Result<Vec<u16>> {
    let needed = count * bytes_per_sample;
    let data = data
        .get(..needed)
        .ok_or_else(|| Error::consistency(format!("sample plane holds {} bytes, need {}", data.len(), needed)))?;
    if bytes_per_sample == 1 {
        return Ok(data.iter().map(|&b| u16::from(b)).collect());
    }
    let mut out = vec![0u16; count];
    LittleEndian::read_u16_into(data, &mut out);
    Ok(out)
}

/// Size of the sign plane for `count` samples.
#[inline]
pub fn sign_plane_len(count: usize) -> usize {
    count.div_ceil(8)
}

/// Encode `pixels` as magnitude + sign planes against `baseline`.
pub fn encode_delta(pixels: &[u16], baseline: &[u16], bytes_per_sample: usize) -> Result<Vec<u8>> {
    if pixels.len() != baseline.len() {
        return Err(Error::consistency(format!(
            "baseline holds {} pixels, frame {}",
            baseline.len(),
            pixels.len()
        )));
    }

    let mut magnitudes = Vec::with_capacity(pixels.len());
    let mut signs = vec![0u8; sign_plane_len(pixels.len())];
    for (i, (&cur, &base)) in pixels.iter().zip(baseline).enumerate() {
        magnitudes.push(cur.abs_diff(base));
        if cur < base {
            signs[i / 8] |= 1 << (i % 8);
        }
    }

    let mut out = pack_samples(&magnitudes, bytes_per_sample);
    out.extend_from_slice(&signs);
    Ok(out)
}

/// Reconstruct pixels from magnitude + sign planes and `baseline`.
pub fn decode_delta(data: &[u8], baseline: &[u16], bytes_per_sample: usize) -> Result<Vec<u16>> {
    let count = baseline.len();
    let plane = count * bytes_per_sample;
    if data.len() != plane + sign_plane_len(count) {
        return Err(Error::consistency(format!(
            "delta payload holds {} bytes, expected {}",
            data.len(),
            plane + sign_plane_len(count)
        )));
    }

    let magnitudes = unpack_samples(&data[..plane], bytes_per_sample, count)?;
    let signs = &data[plane..];
    magnitudes
        .iter()
        .zip(baseline)
        .enumerate()
        .map(|(i, (&mag, &base))| {
            let negative = signs[i / 8] & (1 << (i % 8)) != 0;
            let value = if negative { base.checked_sub(mag) } else { base.checked_add(mag) };
            value.ok_or_else(|| Error::consistency(format!("delta at pixel {} leaves the sample range", i)))
        })
        .collect()
}

/// Encodes and decodes frame payloads for a recording.
#[derive(Clone)]
pub struct FrameEncoder {
    compressor: Arc<dyn Compressor>,
}

impl FrameEncoder {
    /// Create an encoder using `compressor` for `CompressionMode::Generic` layouts.
    pub fn new(compressor: Arc<dyn Compressor>) -> Self {
        Self { compressor }
    }

    /// The compressor strategy.
    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }

    /// Encode normalized `pixels` for `layout`.
    ///
    /// Without a baseline (or for raw layouts) the image is a keyframe.
    pub fn encode(&self, layout: &ImageLayout, pixels: &[u16], baseline: Option<&[u16]>) -> Result<EncodedImage> {
        let bps = layout.bytes_per_sample();
        let (kind, bytes) = match (layout.encoding, baseline) {
            (ImageEncoding::DeltaWithSign, Some(base)) if base.len() == pixels.len() => {
                (FrameKind::Delta, encode_delta(pixels, base, bps)?)
            }
            _ => (FrameKind::Keyframe, pack_samples(pixels, bps)),
        };

        let raw_len = bytes.len() as u32;
        let (payload, compressed) = match layout.compression {
            CompressionMode::None => (bytes, false),
            CompressionMode::Generic => compress_if_smaller(self.compressor.as_ref(), &bytes)?,
        };

        Ok(EncodedImage {
            layout_id: layout.id,
            kind,
            compressed,
            raw_len,
            checksum: crc32(&payload),
            payload,
        })
    }

    /// Decode a stored image back to pixels.
    ///
    /// Delta images need the same baseline the writer used.
    pub fn decode(&self, layout: &ImageLayout, image: &EncodedImage, baseline: Option<&[u16]>) -> Result<Vec<u16>> {
        image.verify()?;

        let bytes = if image.compressed {
            self.compressor.decompress(&image.payload, image.raw_len as usize)?
        } else {
            image.payload.clone()
        };

        let bps = layout.bytes_per_sample();
        match image.kind {
            FrameKind::Keyframe => {
                if bytes.len() != layout.pixel_count() * bps {
                    return Err(Error::consistency(format!(
                        "keyframe holds {} bytes, layout {} needs {}",
                        bytes.len(),
                        layout.id,
                        layout.pixel_count() * bps
                    )));
                }
                unpack_samples(&bytes, bps, layout.pixel_count())
            }
            FrameKind::Delta => {
                let base = baseline.ok_or_else(|| Error::consistency("delta frame without baseline"))?;
                decode_delta(&bytes, base, bps)
            }
        }
    }
}
