//! Frame index: the random-access trailer of an ADV file.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::adv::format::INDEX_ENTRY_SIZE;
use crate::util::{Error, Result};

/// Location of one committed frame record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub frame_no: u32,
    pub offset: u64,
    pub length: u32,
}

impl IndexEntry {
    /// First byte past the frame record.
    ///
    /// Entries held by a [`FrameIndex`] never overflow; saturates otherwise.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length as u64)
    }
}

/// Append-only table of frame records in frame order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameIndex {
    entries: Vec<IndexEntry>,
}

impl FrameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed frame.
    ///
    /// Frame numbers start at 0 and grow by exactly one; records may not
    /// overlap the previous one.
    pub fn append(&mut self, frame_no: u32, offset: u64, length: u32) -> Result<()> {
        let expected = self.entries.len() as u32;
        if frame_no != expected {
            return Err(Error::consistency(format!(
                "index append for frame {} but next frame is {}",
                frame_no, expected
            )));
        }
        if offset.checked_add(length as u64).is_none() {
            return Err(Error::consistency(format!(
                "frame {} at offset {} with length {} overflows the file offset range",
                frame_no, offset, length
            )));
        }
        if let Some(prev) = self.entries.last() {
            if offset < prev.end() {
                return Err(Error::consistency(format!(
                    "frame {} at offset {} overlaps frame {} ending at {}",
                    frame_no,
                    offset,
                    prev.frame_no,
                    prev.end()
                )));
            }
        }
        self.entries.push(IndexEntry { frame_no, offset, length });
        Ok(())
    }

    /// Entry for frame `k`.
    #[inline]
    pub fn get(&self, k: usize) -> Option<&IndexEntry> {
        self.entries.get(k)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// End of the last frame record, if any.
    pub fn end(&self) -> Option<u64> {
        self.entries.last().map(IndexEntry::end)
    }

    /// Size of the serialized trailer.
    pub fn serialized_len(&self) -> usize {
        4 + self.entries.len() * INDEX_ENTRY_SIZE
    }

    /// Serialize as `count: u32` followed by `(offset: u64, length: u32)` tuples.
    pub fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.reserve(self.serialized_len());
        buf.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for entry in &self.entries {
            buf.write_u64::<LittleEndian>(entry.offset)?;
            buf.write_u32::<LittleEndian>(entry.length)?;
        }
        Ok(())
    }

    /// Parse a serialized trailer, re-checking the append rules.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let count = data
            .get(..4)
            .map(LittleEndian::read_u32)
            .ok_or_else(|| Error::invalid("frame index truncated"))? as usize;
        let body = count
            .checked_mul(INDEX_ENTRY_SIZE)
            .and_then(|len| data.get(4..4 + len))
            .ok_or_else(|| Error::invalid(format!("frame index truncated: {} entries declared", count)))?;

        let mut index = Self { entries: Vec::with_capacity(count) };
        for (k, chunk) in body.chunks_exact(INDEX_ENTRY_SIZE).enumerate() {
            let offset = LittleEndian::read_u64(&chunk[0..8]);
            let length = LittleEndian::read_u32(&chunk[8..12]);
            if offset.checked_add(length as u64).is_none() {
                return Err(Error::invalid(format!(
                    "frame index entry {} ({} + {}) overflows",
                    k, offset, length
                )));
            }
            index.append(k as u32, offset, length)?;
        }
        Ok(index)
    }
}
