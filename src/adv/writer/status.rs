//! Status tag definitions, values and the per-frame status block.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use smallvec::SmallVec;

use crate::util::{Error, Result};

/// Longest string a FixedString tag (or List element) can carry.
pub const MAX_STATUS_STRING_LEN: usize = 255;

/// Most entries a List tag can carry in one frame.
pub const MAX_STATUS_LIST_LEN: usize = 16;

/// Most status tags a file can declare.
pub const MAX_STATUS_TAGS: usize = 256;

/// Value type of a status tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusTagType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    /// IEEE single precision.
    Real,
    /// String of at most 255 bytes.
    FixedString,
    /// Up to 16 strings of at most 255 bytes each.
    List,
}

impl StatusTagType {
    /// Type code used in the status section directory.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::UInt8 => 0,
            Self::UInt16 => 1,
            Self::UInt32 => 2,
            Self::UInt64 => 3,
            Self::Real => 4,
            Self::FixedString => 5,
            Self::List => 6,
        }
    }

    /// Parse a directory type code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::UInt8),
            1 => Some(Self::UInt16),
            2 => Some(Self::UInt32),
            3 => Some(Self::UInt64),
            4 => Some(Self::Real),
            5 => Some(Self::FixedString),
            6 => Some(Self::List),
            _ => None,
        }
    }
}

impl fmt::Display for StatusTagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Real => "Real",
            Self::FixedString => "FixedString",
            Self::List => "List",
        };
        f.write_str(name)
    }
}

/// A declared status tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusTagDefinition {
    pub index: u8,
    pub name: String,
    pub tag_type: StatusTagType,
}

/// A typed status value.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusValue {
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Real(f32),
    FixedString(String),
    List(Vec<String>),
}

impl StatusValue {
    /// The tag type this value belongs to.
    pub fn tag_type(&self) -> StatusTagType {
        match self {
            Self::UInt8(_) => StatusTagType::UInt8,
            Self::UInt16(_) => StatusTagType::UInt16,
            Self::UInt32(_) => StatusTagType::UInt32,
            Self::UInt64(_) => StatusTagType::UInt64,
            Self::Real(_) => StatusTagType::Real,
            Self::FixedString(_) => StatusTagType::FixedString,
            Self::List(_) => StatusTagType::List,
        }
    }

    fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::UInt8(v) => buf.write_u8(*v)?,
            Self::UInt16(v) => buf.write_u16::<LittleEndian>(*v)?,
            Self::UInt32(v) => buf.write_u32::<LittleEndian>(*v)?,
            Self::UInt64(v) => buf.write_u64::<LittleEndian>(*v)?,
            Self::Real(v) => buf.write_f32::<LittleEndian>(*v)?,
            Self::FixedString(s) => write_str8(buf, s)?,
            Self::List(items) => {
                buf.write_u8(items.len() as u8)?;
                for item in items {
                    write_str8(buf, item)?;
                }
            }
        }
        Ok(())
    }

    fn read(tag_type: StatusTagType, data: &[u8], pos: &mut usize) -> Result<Self> {
        let value = match tag_type {
            StatusTagType::UInt8 => Self::UInt8(take(data, pos, 1)?[0]),
            StatusTagType::UInt16 => Self::UInt16(LittleEndian::read_u16(take(data, pos, 2)?)),
            StatusTagType::UInt32 => Self::UInt32(LittleEndian::read_u32(take(data, pos, 4)?)),
            StatusTagType::UInt64 => Self::UInt64(LittleEndian::read_u64(take(data, pos, 8)?)),
            StatusTagType::Real => Self::Real(LittleEndian::read_f32(take(data, pos, 4)?)),
            StatusTagType::FixedString => Self::FixedString(read_str8(data, pos)?),
            StatusTagType::List => {
                let count = take(data, pos, 1)?[0] as usize;
                if count > MAX_STATUS_LIST_LEN {
                    return Err(Error::invalid(format!("status list holds {} entries", count)));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(read_str8(data, pos)?);
                }
                Self::List(items)
            }
        };
        Ok(value)
    }
}

fn write_str8(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u8(s.len() as u8)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let bytes = data
        .get(*pos..*pos + len)
        .ok_or_else(|| Error::invalid("status block truncated"))?;
    *pos += len;
    Ok(bytes)
}

fn read_str8(data: &[u8], pos: &mut usize) -> Result<String> {
    let len = take(data, pos, 1)?[0] as usize;
    Ok(String::from_utf8(take(data, pos, len)?.to_vec())?)
}

/// Status values of one frame, ordered by tag index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStatus {
    values: SmallVec<[(u8, StatusValue); 8]>,
}

impl FrameStatus {
    /// Create an empty status block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value for `def`, overwriting any earlier value for the tag.
    pub fn set(&mut self, def: &StatusTagDefinition, value: StatusValue) -> Result<()> {
        check_type(def, value.tag_type())?;
        match &value {
            StatusValue::FixedString(s) => check_string(def, s)?,
            StatusValue::List(items) => {
                if items.len() > MAX_STATUS_LIST_LEN {
                    return Err(Error::Type {
                        tag: def.index,
                        expected: StatusTagType::List.to_string(),
                        actual: format!("list of {} messages, limit {}", items.len(), MAX_STATUS_LIST_LEN),
                    });
                }
                for item in items {
                    check_string(def, item)?;
                }
            }
            _ => {}
        }
        match self.values.binary_search_by_key(&def.index, |(i, _)| *i) {
            Ok(pos) => self.values[pos].1 = value,
            Err(pos) => self.values.insert(pos, (def.index, value)),
        }
        Ok(())
    }

    /// Append one message to a List tag.
    pub fn append_message(&mut self, def: &StatusTagDefinition, message: &str) -> Result<()> {
        check_type(def, StatusTagType::List)?;
        check_string(def, message)?;
        let pos = match self.values.binary_search_by_key(&def.index, |(i, _)| *i) {
            Ok(pos) => pos,
            Err(pos) => {
                self.values.insert(pos, (def.index, StatusValue::List(Vec::new())));
                pos
            }
        };
        if let StatusValue::List(items) = &mut self.values[pos].1 {
            if items.len() >= MAX_STATUS_LIST_LEN {
                return Err(Error::Type {
                    tag: def.index,
                    expected: StatusTagType::List.to_string(),
                    actual: format!("message past the {}-entry limit", MAX_STATUS_LIST_LEN),
                });
            }
            items.push(message.to_string());
        }
        Ok(())
    }

    /// Value recorded for a tag index.
    pub fn get(&self, index: u8) -> Option<&StatusValue> {
        self.values
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| &self.values[pos].1)
    }

    /// Iterate over (tag index, value) pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &StatusValue)> {
        self.values.iter().map(|(i, v)| (*i, v))
    }

    /// Number of tags set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no tag is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize the status block.
    ///
    /// Format: `count: u16`, then per value `tag index: u8` + typed value.
    pub(crate) fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u16::<LittleEndian>(self.values.len() as u16)?;
        for (index, value) in &self.values {
            buf.write_u8(*index)?;
            value.write(buf)?;
        }
        Ok(())
    }

    /// Parse a status block against the declared tags.
    pub(crate) fn parse(data: &[u8], pos: &mut usize, defs: &[StatusTagDefinition]) -> Result<Self> {
        let count = LittleEndian::read_u16(take(data, pos, 2)?) as usize;
        let mut status = Self::new();
        for _ in 0..count {
            let index = take(data, pos, 1)?[0];
            let def = defs
                .get(index as usize)
                .ok_or_else(|| Error::invalid(format!("undeclared status tag {}", index)))?;
            let value = StatusValue::read(def.tag_type, data, pos)?;
            status.values.push((index, value));
        }
        Ok(status)
    }
}

fn check_type(def: &StatusTagDefinition, actual: StatusTagType) -> Result<()> {
    if def.tag_type != actual {
        return Err(Error::Type {
            tag: def.index,
            expected: def.tag_type.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn check_string(def: &StatusTagDefinition, s: &str) -> Result<()> {
    if s.len() > MAX_STATUS_STRING_LEN {
        return Err(Error::Type {
            tag: def.index,
            expected: def.tag_type.to_string(),
            actual: format!("{}-byte string, limit {}", s.len(), MAX_STATUS_STRING_LEN),
        });
    }
    Ok(())
}

/// Serialize the status section directory.
pub(crate) fn write_status_directory(buf: &mut Vec<u8>, defs: &[StatusTagDefinition]) -> Result<()> {
    buf.write_u16::<LittleEndian>(defs.len() as u16)?;
    for def in defs {
        write_str8(buf, &def.name)?;
        buf.write_u8(def.tag_type.to_u8())?;
    }
    Ok(())
}

/// Parse the status section directory, returning definitions and bytes consumed.
pub(crate) fn parse_status_directory(data: &[u8]) -> Result<(Vec<StatusTagDefinition>, usize)> {
    let mut pos = 0;
    let count = LittleEndian::read_u16(take(data, &mut pos, 2)?) as usize;
    if count > MAX_STATUS_TAGS {
        return Err(Error::invalid(format!("status directory declares {} tags", count)));
    }
    let mut defs = Vec::with_capacity(count);
    for index in 0..count {
        let name = read_str8(data, &mut pos)?;
        let code = take(data, &mut pos, 1)?[0];
        let tag_type = StatusTagType::from_u8(code)
            .ok_or_else(|| Error::invalid(format!("unknown status tag type {}", code)))?;
        defs.push(StatusTagDefinition { index: index as u8, name, tag_type });
    }
    Ok((defs, pos))
}
