//! File-level metadata tags.
//!
//! Tags are name/value string pairs stored once per file. Names are unique;
//! setting an existing name overwrites its value in place so the insertion
//! order of the remaining entries is preserved.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::util::{Error, Result};

/// Ordered, owned-key file tag map.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FileTags {
    entries: Vec<(String, String)>,
}

impl FileTags {
    /// Create an empty tag map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a tag value (last write wins).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();

        if name.is_empty() {
            return Err(Error::config("file tag name must not be empty"));
        }
        if name.len() > u16::MAX as usize || value.len() > u16::MAX as usize {
            return Err(Error::config(format!("file tag '{}' exceeds 65535 bytes", name)));
        }

        for (k, v) in &mut self.entries {
            if *k == name {
                *v = value;
                return Ok(());
            }
        }
        if self.entries.len() >= u16::MAX as usize {
            return Err(Error::config("too many file tags"));
        }
        self.entries.push((name, value));
        Ok(())
    }

    /// Get a tag value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Check if a tag exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Get the number of tags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over name/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize to the FileTags block layout.
    ///
    /// Format: `count: u16`, then per tag `name` and `value` as
    /// `len: u16` + UTF-8 bytes.
    pub fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u16::<LittleEndian>(self.entries.len() as u16)?;
        for (k, v) in &self.entries {
            write_str16(buf, k)?;
            write_str16(buf, v)?;
        }
        Ok(())
    }

    /// Parse a FileTags block, returning the tags and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let count = read_u16(data, 0)? as usize;
        let mut pos = 2;
        let mut tags = Self::new();
        for _ in 0..count {
            let (name, used) = read_str16(data, pos)?;
            pos += used;
            let (value, used) = read_str16(data, pos)?;
            pos += used;
            tags.entries.push((name, value));
        }
        Ok((tags, pos))
    }
}

impl fmt::Debug for FileTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

fn write_str16(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u16::<LittleEndian>(s.len() as u16)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16> {
    data.get(pos..pos + 2)
        .map(LittleEndian::read_u16)
        .ok_or_else(|| Error::invalid("file tags truncated"))
}

fn read_str16(data: &[u8], pos: usize) -> Result<(String, usize)> {
    let len = read_u16(data, pos)? as usize;
    let bytes = data
        .get(pos + 2..pos + 2 + len)
        .ok_or_else(|| Error::invalid("file tag string truncated"))?;
    Ok((String::from_utf8(bytes.to_vec())?, 2 + len))
}
