//! Durable byte sinks for ADV recording.
//!
//! A sink tracks its own write position so that every offset recorded in the
//! frame index is exact by construction. A failed write poisons the sink:
//! the position can no longer be trusted and every later operation fails.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Seek, SeekFrom, Write};
use std::path::Path;

use crate::util::{Error, Result};

/// Default write buffer for [`FileSink`].
pub const DEFAULT_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

/// Destination of an ADV recording.
pub trait Sink {
    /// Write all bytes at the current position.
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    /// Current write position.
    fn position(&self) -> u64;

    /// Move the write position.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Flush buffered bytes to the underlying storage.
    fn flush(&mut self) -> Result<()>;

    /// Cut the sink to `len` bytes and position at its end.
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Flush and release the underlying storage.
    fn close(&mut self) -> Result<()>;

    /// Fail fast when the sink can no longer accept frames.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }
}

fn poisoned_error() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::Other,
        "sink is poisoned by an earlier write failure",
    ))
}

fn closed_error() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::NotConnected, "sink is closed"))
}

/// Buffered file sink.
pub struct FileSink {
    writer: Option<BufWriter<File>>,
    pos: u64,
    poisoned: bool,
}

impl FileSink {
    /// Create (truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_capacity(path, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create the file with an explicit write buffer size.
    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: Some(BufWriter::with_capacity(capacity, file)),
            pos: 0,
            poisoned: false,
        })
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        self.writer.as_mut().ok_or_else(closed_error)
    }

    /// Run an I/O step, poisoning the sink when it fails.
    fn guard<T>(&mut self, op: impl FnOnce(&mut BufWriter<File>) -> io::Result<T>) -> Result<T> {
        let result = op(self.writer()?);
        if result.is_err() {
            self.poisoned = true;
        }
        Ok(result?)
    }
}

impl Sink for FileSink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.guard(|w| w.write_all(data))?;
        self.pos += data.len() as u64;
        Ok(())
    }

    #[inline]
    fn position(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = self.guard(|w| {
            w.flush()?;
            w.seek(SeekFrom::Start(pos))
        })?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.guard(|w| w.flush())
    }

    /// Also recovers a poisoned sink: bytes still buffered are dropped
    /// unwritten and the file is cut back to `len`.
    fn truncate(&mut self, len: u64) -> Result<()> {
        if !self.poisoned {
            self.guard(|w| w.flush())?;
        }
        let writer = self.writer.take().ok_or_else(closed_error)?;
        let capacity = writer.capacity();
        let (mut file, _unwritten) = writer.into_parts();

        let result = file.set_len(len).and_then(|()| file.seek(SeekFrom::Start(len)));
        self.writer = Some(BufWriter::with_capacity(capacity, file));
        match result {
            Ok(pos) => {
                self.pos = pos;
                self.poisoned = false;
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e.into())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.writer.is_none() {
            return Ok(());
        }
        let result = self.guard(|w| {
            w.flush()?;
            w.get_ref().sync_all()
        });
        self.writer = None;
        result
    }

    fn check_ready(&self) -> Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        if self.writer.is_none() {
            return Err(closed_error());
        }
        Ok(())
    }
}

/// In-memory sink, mostly useful for tests and for encoding to a buffer.
#[derive(Debug, Default)]
pub struct MemorySink {
    cursor: Cursor<Vec<u8>>,
    closed: bool,
}

impl MemorySink {
    /// Create an empty memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    /// Consume the sink and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Sink for MemorySink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        self.cursor.write_all(data)?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.cursor.set_position(pos);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.cursor.get_mut().truncate(len as usize);
        self.cursor.set_position(len);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn check_ready(&self) -> Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        Ok(())
    }
}
