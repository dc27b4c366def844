//! ADV format constants and header structure.

use byteorder::{ByteOrder, LittleEndian};

use crate::util::{Error, Result};

/// Magic bytes at the start of an ADV file.
pub const ADV_MAGIC: &[u8; 4] = b"FSTF";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 4;

/// Offset of the state flag in the header.
pub const STATE_OFFSET: usize = 6;

/// Offset of the frame count in the header.
pub const FRAME_COUNT_OFFSET: usize = 8;

/// Offset of the image layout count in the header.
pub const LAYOUT_COUNT_OFFSET: usize = 12;

/// Offset of the status tag count in the header.
pub const STATUS_TAG_COUNT_OFFSET: usize = 13;

/// Offset of the schema block position in the header.
pub const SCHEMA_POS_OFFSET: usize = 16;

/// Offset of the index trailer position in the header.
pub const INDEX_POS_OFFSET: usize = 24;

/// Current ADV format version.
pub const CURRENT_VERSION: u16 = 1;

/// State flag value once the file has been finalized.
pub const FINALIZED_FLAG: u8 = 0xFF;

/// State flag value while recording (or after an aborted recording).
pub const RECORDING_FLAG: u8 = 0x00;

/// Marker at the start of every frame record.
pub const FRAME_MARKER: u32 = 0xEE01_22FF;

/// Size of one index trailer entry (offset u64 + length u32).
pub const INDEX_ENTRY_SIZE: usize = 12;

/// Fixed part of a frame record before the status block.
pub const FRAME_PREFIX_SIZE: usize = 4 + 8 + 4 + 4;

/// Decoded file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub finalized: bool,
    pub frame_count: u32,
    pub layout_count: u8,
    pub status_tag_count: u8,
    pub schema_pos: u64,
    pub index_pos: u64,
}

impl FileHeader {
    /// Header written by `BeginFile`, before anything is known.
    pub fn placeholder() -> Self {
        Self {
            version: CURRENT_VERSION,
            finalized: false,
            frame_count: 0,
            layout_count: 0,
            status_tag_count: 0,
            schema_pos: 0,
            index_pos: 0,
        }
    }

    /// Encode to the fixed header layout.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(ADV_MAGIC);
        LittleEndian::write_u16(&mut buf[VERSION_OFFSET..], self.version);
        buf[STATE_OFFSET] = if self.finalized { FINALIZED_FLAG } else { RECORDING_FLAG };
        LittleEndian::write_u32(&mut buf[FRAME_COUNT_OFFSET..], self.frame_count);
        buf[LAYOUT_COUNT_OFFSET] = self.layout_count;
        buf[STATUS_TAG_COUNT_OFFSET] = self.status_tag_count;
        LittleEndian::write_u64(&mut buf[SCHEMA_POS_OFFSET..], self.schema_pos);
        LittleEndian::write_u64(&mut buf[INDEX_POS_OFFSET..], self.index_pos);
        buf
    }

    /// Parse and validate the header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof(data.len() as u64));
        }
        if &data[0..4] != ADV_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let version = LittleEndian::read_u16(&data[VERSION_OFFSET..]);
        if version != CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            finalized: data[STATE_OFFSET] == FINALIZED_FLAG,
            frame_count: LittleEndian::read_u32(&data[FRAME_COUNT_OFFSET..]),
            layout_count: data[LAYOUT_COUNT_OFFSET],
            status_tag_count: data[STATUS_TAG_COUNT_OFFSET],
            schema_pos: LittleEndian::read_u64(&data[SCHEMA_POS_OFFSET..]),
            index_pos: LittleEndian::read_u64(&data[INDEX_POS_OFFSET..]),
        })
    }
}
