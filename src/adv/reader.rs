//! ADV file reader.
//!
//! Memory-maps a finalized recording and gives random access to its frames
//! through the index trailer.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use rayon::prelude::*;
use tracing::debug;

use super::format::{FileHeader, FRAME_MARKER, FRAME_PREFIX_SIZE, HEADER_SIZE};
use super::writer::{
    parse_layout_directory, parse_status_directory, DeltaBaseline, EncodedImage, FrameEncoder,
    FrameIndex, FrameKind, FrameStatus, ImageLayout, StatusTagDefinition,
};
use crate::core::{Compressor, FileTags, Ticks, ZlibCompressor};
use crate::util::{Error, Result};

/// One frame record read back from a file.
#[derive(Clone, Debug, PartialEq)]
pub struct AdvFrame {
    pub frame_no: u32,
    pub timestamp: Ticks,
    pub elapsed: u32,
    pub exposure: u32,
    pub status: FrameStatus,
    pub image: Option<EncodedImage>,
}

/// Summary returned by [`AdvReader::verify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub frames: usize,
    pub images: usize,
    pub payload_bytes: u64,
}

/// Read-only view of a finalized ADV file.
pub struct AdvReader {
    path: PathBuf,
    mmap: Mmap,
    header: FileHeader,
    tags: FileTags,
    layouts: Vec<ImageLayout>,
    status_tags: Vec<StatusTagDefinition>,
    index: FrameIndex,
    encoder: FrameEncoder,
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = open_file(path)?;
    let size = file.metadata()?.len();
    if size < HEADER_SIZE as u64 {
        return Err(Error::UnexpectedEof(size));
    }
    // Safety: the file is opened read-only; recordings are not modified
    // while a reader holds them.
    Ok(unsafe { Mmap::map(&file) }?)
}

impl AdvReader {
    /// Open a finalized file, decoding compressed payloads with zlib.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Arc::new(ZlibCompressor::default()))
    }

    /// Open a finalized file with a specific compressor strategy.
    pub fn open_with(path: impl AsRef<Path>, compressor: Arc<dyn Compressor>) -> Result<Self> {
        let path = path.as_ref();
        let mmap = map_file(path)?;
        let header = FileHeader::parse(&mmap)?;
        if !header.finalized {
            return Err(Error::Incomplete);
        }

        let schema = slice_from(&mmap, header.schema_pos)?;
        let (tags, used) = FileTags::parse(schema)?;
        let schema = &schema[used..];
        let (layouts, used) = parse_layout_directory(schema)?;
        let (status_tags, _) = parse_status_directory(&schema[used..])?;
        if layouts.len() != header.layout_count as usize {
            return Err(Error::invalid(format!(
                "header declares {} layouts, directory holds {}",
                header.layout_count,
                layouts.len()
            )));
        }

        let index = FrameIndex::deserialize(slice_from(&mmap, header.index_pos)?)?;
        if index.len() != header.frame_count as usize {
            return Err(Error::invalid(format!(
                "header declares {} frames, index holds {}",
                header.frame_count,
                index.len()
            )));
        }
        for entry in index.iter() {
            if entry.offset < HEADER_SIZE as u64 || entry.end() > header.index_pos {
                return Err(Error::invalid(format!(
                    "frame {} at {}..{} lies outside the frame area {}..{}",
                    entry.frame_no,
                    entry.offset,
                    entry.end(),
                    HEADER_SIZE,
                    header.index_pos
                )));
            }
        }

        debug!(path = %path.display(), frames = index.len(), layouts = layouts.len(), "ADV file opened");
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            tags,
            layouts,
            status_tags,
            index,
            encoder: FrameEncoder::new(compressor),
        })
    }

    /// Read only the header, without requiring a finalized file.
    pub fn probe(path: impl AsRef<Path>) -> Result<FileHeader> {
        let mmap = map_file(path.as_ref())?;
        FileHeader::parse(&mmap)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.header.version
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.header.finalized
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Total file size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn file_tags(&self) -> &FileTags {
        &self.tags
    }

    pub fn layouts(&self) -> &[ImageLayout] {
        &self.layouts
    }

    /// Layout registered under `id`.
    pub fn layout(&self, id: u8) -> Result<&ImageLayout> {
        self.layouts
            .iter()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::invalid(format!("frame references unknown layout {}", id)))
    }

    pub fn status_tags(&self) -> &[StatusTagDefinition] {
        &self.status_tags
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    /// Raw bytes of frame record `k`.
    fn record(&self, k: usize) -> Result<&[u8]> {
        let entry = self.index.get(k).ok_or(Error::FrameOutOfBounds {
            index: k as u64,
            count: self.index.len() as u64,
        })?;
        let start = usize::try_from(entry.offset).map_err(|_| Error::UnexpectedEof(entry.offset))?;
        let end = start
            .checked_add(entry.length as usize)
            .ok_or(Error::UnexpectedEof(entry.end()))?;
        self.mmap.get(start..end).ok_or(Error::UnexpectedEof(entry.end()))
    }

    /// Read frame `k` through the index.
    pub fn read_frame(&self, k: usize) -> Result<AdvFrame> {
        parse_frame(self.record(k)?, k as u32, &self.status_tags)
    }

    /// Iterate over all frames in order.
    pub fn frames(&self) -> impl Iterator<Item = Result<AdvFrame>> + '_ {
        (0..self.frame_count()).map(move |k| self.read_frame(k))
    }

    /// Decode the pixels of frame `k`, or `None` for a status-only frame.
    ///
    /// Delta images are replayed from the nearest preceding keyframe of the
    /// same layout.
    pub fn decode_pixels(&self, k: usize) -> Result<Option<Vec<u16>>> {
        let Some(image) = self.read_frame(k)?.image else {
            return Ok(None);
        };
        let layout = self.layout(image.layout_id)?;
        if image.kind == FrameKind::Keyframe {
            return self.encoder.decode(layout, &image, None).map(Some);
        }

        let mut chain = vec![image];
        let mut j = k;
        loop {
            if j == 0 {
                return Err(Error::consistency(format!("delta frame {} has no preceding keyframe", k)));
            }
            j -= 1;
            let Some(prev) = self.read_frame(j)?.image else {
                continue;
            };
            if prev.layout_id != layout.id {
                continue;
            }
            let is_key = prev.kind == FrameKind::Keyframe;
            if is_key || layout.baseline == DeltaBaseline::PreviousFrame {
                chain.push(prev);
            }
            if is_key {
                break;
            }
        }

        let mut images = chain.iter().rev();
        let mut pixels = match images.next() {
            Some(key) => self.encoder.decode(layout, key, None)?,
            None => return Err(Error::consistency("empty decode chain")),
        };
        for image in images {
            pixels = self.encoder.decode(layout, image, Some(&pixels))?;
        }
        Ok(Some(pixels))
    }

    /// Recompute every stored checksum and check the index geometry.
    pub fn verify(&self) -> Result<VerifyReport> {
        let data_start = HEADER_SIZE as u64;
        let data_end = self.header.index_pos;
        if data_end.checked_add(self.index.serialized_len() as u64) != Some(self.mmap.len() as u64) {
            return Err(Error::consistency(format!(
                "index trailer at {} does not end the file ({} bytes)",
                data_end,
                self.mmap.len()
            )));
        }
        for entry in self.index.iter() {
            if entry.offset < data_start || entry.end() > data_end {
                return Err(Error::consistency(format!(
                    "frame {} at {}..{} lies outside the frame area",
                    entry.frame_no,
                    entry.offset,
                    entry.end()
                )));
            }
        }

        (0..self.frame_count())
            .into_par_iter()
            .map(|k| {
                let frame = self.read_frame(k)?;
                let mut report = VerifyReport { frames: 1, ..Default::default() };
                if let Some(image) = frame.image {
                    image
                        .verify()
                        .map_err(|e| Error::consistency(format!("frame {}: {}", k, e)))?;
                    self.layout(image.layout_id)?;
                    report.images = 1;
                    report.payload_bytes = image.payload.len() as u64;
                }
                Ok(report)
            })
            .try_reduce(VerifyReport::default, |a, b| {
                Ok(VerifyReport {
                    frames: a.frames + b.frames,
                    images: a.images + b.images,
                    payload_bytes: a.payload_bytes + b.payload_bytes,
                })
            })
    }
}

fn slice_from(data: &[u8], pos: u64) -> Result<&[u8]> {
    data.get(pos as usize..).ok_or(Error::UnexpectedEof(pos))
}

/// Parse one frame record.
fn parse_frame(data: &[u8], frame_no: u32, defs: &[StatusTagDefinition]) -> Result<AdvFrame> {
    if data.len() < FRAME_PREFIX_SIZE {
        return Err(Error::invalid(format!("frame {} record truncated", frame_no)));
    }
    let marker = LittleEndian::read_u32(&data[0..4]);
    if marker != FRAME_MARKER {
        return Err(Error::invalid(format!("frame {} has bad marker {:#010x}", frame_no, marker)));
    }
    let timestamp = LittleEndian::read_i64(&data[4..12]);
    let elapsed = LittleEndian::read_u32(&data[12..16]);
    let exposure = LittleEndian::read_u32(&data[16..20]);

    let mut pos = FRAME_PREFIX_SIZE;
    let status = FrameStatus::parse(data, &mut pos, defs)?;
    let has_image = *data
        .get(pos)
        .ok_or_else(|| Error::invalid(format!("frame {} record truncated", frame_no)))?;
    pos += 1;
    let image = match has_image {
        0 => None,
        1 => Some(EncodedImage::parse(data, &mut pos)?),
        other => return Err(Error::invalid(format!("frame {} has bad image flag {}", frame_no, other))),
    };
    if pos != data.len() {
        return Err(Error::invalid(format!(
            "frame {} record has {} trailing bytes",
            frame_no,
            data.len() - pos
        )));
    }

    Ok(AdvFrame { frame_no, timestamp, elapsed, exposure, status, image })
}
