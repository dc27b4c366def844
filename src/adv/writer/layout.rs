//! Image layouts and the image section directory.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::util::{Error, Result};

/// How pixels of a layout are laid out in the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    /// Pixel samples verbatim.
    Raw,
    /// Magnitude plane of differences to a baseline plus a bit-packed sign plane.
    DeltaWithSign,
}

/// Which frame a delta-encoded layout differences against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaBaseline {
    /// The most recent keyframe of the layout.
    Keyframe,
    /// The previous frame of the layout.
    PreviousFrame,
}

/// Compression applied to the encoded payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressionMode {
    None,
    /// The recorder's generic compressor strategy.
    Generic,
}

/// An image layout: geometry, depth and payload encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageLayout {
    pub id: u8,
    pub width: u32,
    pub height: u32,
    /// Significant bits per pixel (1..=16).
    pub bpp: u8,
    pub encoding: ImageEncoding,
    pub baseline: DeltaBaseline,
    pub compression: CompressionMode,
    /// Re-encode every N-th frame of the layout as a keyframe (0 = only the first).
    pub keyframe_interval: u32,
}

impl ImageLayout {
    /// Raw layout without compression.
    pub fn raw(id: u8, width: u32, height: u32, bpp: u8) -> Self {
        Self {
            id,
            width,
            height,
            bpp,
            encoding: ImageEncoding::Raw,
            baseline: DeltaBaseline::Keyframe,
            compression: CompressionMode::None,
            keyframe_interval: 0,
        }
    }

    /// Delta-with-sign layout against the given baseline.
    pub fn delta(id: u8, width: u32, height: u32, bpp: u8, baseline: DeltaBaseline) -> Self {
        Self {
            encoding: ImageEncoding::DeltaWithSign,
            baseline,
            ..Self::raw(id, width, height, bpp)
        }
    }

    /// Set the payload compression.
    pub fn with_compression(mut self, compression: CompressionMode) -> Self {
        self.compression = compression;
        self
    }

    /// Set the keyframe interval.
    pub fn with_keyframe_interval(mut self, interval: u32) -> Self {
        self.keyframe_interval = interval;
        self
    }

    /// Number of pixels in one frame.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes per stored sample (1 for bpp <= 8, else 2).
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        if self.bpp <= 8 { 1 } else { 2 }
    }

    /// Largest sample value representable at this depth.
    #[inline]
    pub fn max_value(&self) -> u16 {
        ((1u32 << self.bpp) - 1) as u16
    }

    /// Check that the layout is well formed.
    pub fn validate(&self) -> Result<()> {
        if !(1..=16).contains(&self.bpp) {
            return Err(Error::config(format!("layout {}: bpp {} not in 1..=16", self.id, self.bpp)));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::config(format!("layout {}: empty frame geometry", self.id)));
        }
        let payload = self.pixel_count() as u64 * self.bytes_per_sample() as u64;
        if payload > u32::MAX as u64 / 2 {
            return Err(Error::config(format!(
                "layout {}: {}x{} frame is too large",
                self.id, self.width, self.height
            )));
        }
        Ok(())
    }
}

fn encoding_to_u8(encoding: ImageEncoding) -> u8 {
    match encoding {
        ImageEncoding::Raw => 0,
        ImageEncoding::DeltaWithSign => 1,
    }
}

fn encoding_from_u8(value: u8) -> Option<ImageEncoding> {
    match value {
        0 => Some(ImageEncoding::Raw),
        1 => Some(ImageEncoding::DeltaWithSign),
        _ => None,
    }
}

fn baseline_to_u8(baseline: DeltaBaseline) -> u8 {
    match baseline {
        DeltaBaseline::Keyframe => 0,
        DeltaBaseline::PreviousFrame => 1,
    }
}

fn baseline_from_u8(value: u8) -> Option<DeltaBaseline> {
    match value {
        0 => Some(DeltaBaseline::Keyframe),
        1 => Some(DeltaBaseline::PreviousFrame),
        _ => None,
    }
}

fn compression_to_u8(compression: CompressionMode) -> u8 {
    match compression {
        CompressionMode::None => 0,
        CompressionMode::Generic => 1,
    }
}

fn compression_from_u8(value: u8) -> Option<CompressionMode> {
    match value {
        0 => Some(CompressionMode::None),
        1 => Some(CompressionMode::Generic),
        _ => None,
    }
}

/// Size of one serialized layout entry.
const LAYOUT_ENTRY_SIZE: usize = 1 + 4 + 4 + 1 + 1 + 1 + 1 + 4;

/// Serialize the image section directory.
pub(crate) fn write_layout_directory(buf: &mut Vec<u8>, layouts: &[ImageLayout]) -> Result<()> {
    buf.write_u8(layouts.len() as u8)?;
    for layout in layouts {
        buf.write_u8(layout.id)?;
        buf.write_u32::<LittleEndian>(layout.width)?;
        buf.write_u32::<LittleEndian>(layout.height)?;
        buf.write_u8(layout.bpp)?;
        buf.write_u8(encoding_to_u8(layout.encoding))?;
        buf.write_u8(baseline_to_u8(layout.baseline))?;
        buf.write_u8(compression_to_u8(layout.compression))?;
        buf.write_u32::<LittleEndian>(layout.keyframe_interval)?;
    }
    Ok(())
}

/// Parse the image section directory, returning layouts and bytes consumed.
pub(crate) fn parse_layout_directory(data: &[u8]) -> Result<(Vec<ImageLayout>, usize)> {
    let count = *data.first().ok_or_else(|| Error::invalid("image directory truncated"))? as usize;
    let end = 1 + count * LAYOUT_ENTRY_SIZE;
    if data.len() < end {
        return Err(Error::invalid("image directory truncated"));
    }

    let mut layouts = Vec::with_capacity(count);
    for entry in data[1..end].chunks_exact(LAYOUT_ENTRY_SIZE) {
        let layout = ImageLayout {
            id: entry[0],
            width: LittleEndian::read_u32(&entry[1..5]),
            height: LittleEndian::read_u32(&entry[5..9]),
            bpp: entry[9],
            encoding: encoding_from_u8(entry[10])
                .ok_or_else(|| Error::invalid(format!("unknown image encoding {}", entry[10])))?,
            baseline: baseline_from_u8(entry[11])
                .ok_or_else(|| Error::invalid(format!("unknown delta baseline {}", entry[11])))?,
            compression: compression_from_u8(entry[12])
                .ok_or_else(|| Error::invalid(format!("unknown compression {}", entry[12])))?,
            keyframe_interval: LittleEndian::read_u32(&entry[13..17]),
        };
        layout.validate().map_err(|e| Error::invalid(e.to_string()))?;
        layouts.push(layout);
    }
    Ok((layouts, end))
}
