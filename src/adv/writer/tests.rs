use super::*;
use crate::adv::format::{FileHeader, ADV_MAGIC, FINALIZED_FLAG, HEADER_SIZE, RECORDING_FLAG, STATE_OFFSET};
use crate::util::{Error, Result};
use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Memory sink whose writes start failing once the shared switch is set.
struct FailingSink {
    inner: MemorySink,
    fail: Arc<AtomicBool>,
    failed: bool,
    fail_close: bool,
}

impl FailingSink {
    fn new() -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        let sink = Self {
            inner: MemorySink::new(),
            fail: Arc::clone(&fail),
            failed: false,
            fail_close: false,
        };
        (sink, fail)
    }
}

impl Sink for FailingSink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.failed || self.fail.load(Ordering::SeqCst) {
            self.failed = true;
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        self.inner.write_bytes(data)
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(pos)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.inner.truncate(len)
    }

    fn close(&mut self) -> Result<()> {
        if self.fail_close {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "sync failed")));
        }
        self.inner.close()
    }

    fn check_ready(&self) -> Result<()> {
        if self.failed {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        Ok(())
    }
}

fn memory_file() -> Result<AdvFile<MemorySink>> {
    let mut file: AdvFile<MemorySink> = AdvFile::default();
    file.begin(MemorySink::new())?;
    Ok(file)
}

fn ramp(n: usize) -> Vec<u16> {
    (0..n).map(|i| (i * 7 % 4096) as u16).collect()
}

#[test]
fn test_write_empty_file() -> Result<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut file = AdvFile::new();
    file.begin_file(path)?;
    assert!(file.is_recording());
    file.end_file()?;
    assert_eq!(file.state(), FileState::Finalized);

    let mut header = [0u8; HEADER_SIZE];
    File::open(path)?.read_exact(&mut header)?;
    assert_eq!(&header[0..4], ADV_MAGIC);
    assert_eq!(header[STATE_OFFSET], FINALIZED_FLAG);

    let header = FileHeader::parse(&header)?;
    assert_eq!(header.frame_count, 0);
    assert_eq!(header.schema_pos, HEADER_SIZE as u64);
    Ok(())
}

#[test]
fn test_single_frame_in_memory() -> Result<()> {
    let mut file = memory_file()?;
    file.add_image_section(ImageLayout::raw(1, 4, 4, 16))?;
    file.begin_frame(1000, 0, 40)?;
    file.add_frame_image(1, &ramp(16), 16)?;
    file.end_frame()?;
    file.end_file()?;

    assert_eq!(file.frame_count(), 1);
    let entry = *file.index().get(0).unwrap();
    let bytes = file.into_sink().unwrap().into_bytes();

    let header = FileHeader::parse(&bytes)?;
    assert!(header.finalized);
    assert_eq!(header.frame_count, 1);
    assert_eq!(header.layout_count, 1);
    assert_eq!(header.index_pos, entry.end());
    assert_eq!(bytes.len() as u64, header.index_pos + 4 + 12);
    assert_eq!(&bytes[entry.offset as usize..entry.offset as usize + 4], &0xEE01_22FFu32.to_le_bytes());
    Ok(())
}

#[test]
fn test_unregistered_layout_aborts_frame() -> Result<()> {
    let mut file = memory_file()?;
    file.add_image_section(ImageLayout::raw(1, 2, 2, 8))?;

    file.begin_frame(0, 0, 0)?;
    let err = file.add_frame_image(9, &[0; 4], 8).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!file.in_frame());
    assert!(matches!(file.end_frame(), Err(Error::State(_))));
    assert!(file.index().is_empty());

    // The next frame proceeds normally and takes frame number 0.
    file.begin_frame(400, 0, 0)?;
    file.add_frame_image(1, &[1, 2, 3, 4], 8)?;
    file.end_frame()?;
    assert_eq!(file.index().get(0).map(|e| e.frame_no), Some(0));
    file.end_file()
}

#[test]
fn test_lifecycle_errors() -> Result<()> {
    let mut file: AdvFile<MemorySink> = AdvFile::default();
    assert!(matches!(file.begin_frame(0, 0, 0), Err(Error::State(_))));
    assert!(matches!(file.end_file(), Err(Error::State(_))));

    file.begin(MemorySink::new())?;
    assert!(matches!(file.begin(MemorySink::new()), Err(Error::State(_))));
    assert!(matches!(file.end_frame(), Err(Error::State(_))));
    assert!(matches!(file.add_frame_status_tag_u8(0, 1), Err(Error::State(_))));

    file.begin_frame(0, 0, 0)?;
    assert!(matches!(file.begin_frame(1, 0, 0), Err(Error::State(_))));
    assert!(!file.in_frame());

    file.begin_frame(2, 0, 0)?;
    assert!(matches!(file.end_file(), Err(Error::State(_))));
    assert!(file.is_recording());
    file.end_file()?;
    assert!(matches!(file.begin_frame(3, 0, 0), Err(Error::State(_))));
    Ok(())
}

#[test]
fn test_schema_closes_at_first_frame() -> Result<()> {
    let mut file = memory_file()?;
    file.add_file_tag("OBSERVER", "someone")?;
    file.add_image_section(ImageLayout::raw(1, 2, 2, 8))?;
    file.add_status_tag("Gain", StatusTagType::Real)?;

    file.begin_frame(0, 0, 0)?;
    file.end_frame()?;

    assert!(matches!(file.add_file_tag("LATE", "x"), Err(Error::Config(_))));
    assert!(matches!(file.add_image_section(ImageLayout::raw(2, 2, 2, 8)), Err(Error::Config(_))));
    assert!(matches!(file.add_status_tag("Late", StatusTagType::UInt8), Err(Error::Config(_))));
    assert!(matches!(file.set_compression_level(1), Err(Error::Config(_))));
    file.end_file()
}

#[test]
fn test_schema_validation() -> Result<()> {
    let mut file = memory_file()?;
    file.add_image_section(ImageLayout::raw(1, 2, 2, 8))?;
    assert!(matches!(file.add_image_section(ImageLayout::raw(1, 4, 4, 8)), Err(Error::Config(_))));
    assert!(matches!(file.add_image_section(ImageLayout::raw(2, 4, 4, 20)), Err(Error::Config(_))));

    assert_eq!(file.add_status_tag("Gain", StatusTagType::Real)?, 0);
    assert_eq!(file.add_status_tag("Gamma", StatusTagType::Real)?, 1);
    assert!(matches!(file.add_status_tag("Gain", StatusTagType::UInt8), Err(Error::Config(_))));
    assert!(matches!(file.add_status_tag("", StatusTagType::UInt8), Err(Error::Config(_))));
    assert_eq!(file.status_tags().len(), 2);
    file.end_file()
}

#[test]
fn test_default_file_tags() -> Result<()> {
    let mut file = memory_file()?;
    file.add_file_tag(TAG_RECORDER, "custom recorder")?;
    file.add_file_tag("TELESCOPE", "C11")?;
    file.end_file()?;

    let tags = file.file_tags();
    assert_eq!(tags.get(TAG_RECORDER), Some("custom recorder"));
    assert_eq!(tags.get(TAG_ADV_VERSION), Some("1"));
    assert_eq!(tags.get(TAG_COMPRESSION), Some("zlib"));
    assert_eq!(tags.get("TELESCOPE"), Some("C11"));
    // Caller tags keep their position ahead of the defaults.
    assert_eq!(tags.iter().next().map(|(k, _)| k), Some(TAG_RECORDER));
    Ok(())
}

#[test]
fn test_status_tags() -> Result<()> {
    let mut file = memory_file()?;
    let gain = file.add_status_tag("Gain", StatusTagType::Real)?;
    let frames = file.add_status_tag("FrameCounter", StatusTagType::UInt32)?;
    let log = file.add_status_tag("Messages", StatusTagType::List)?;

    file.begin_frame(0, 0, 0)?;
    file.add_frame_status_tag_real(gain, 2.5)?;
    file.add_frame_status_tag_u32(frames, 10)?;
    file.add_frame_status_tag_u32(frames, 11)?;
    file.add_frame_status_tag_message(log, "first")?;
    file.add_frame_status_tag_message(log, "second")?;
    file.end_frame()?;

    file.begin_frame(400, 0, 0)?;
    let err = file.add_frame_status_tag_u16(gain, 3).unwrap_err();
    assert!(matches!(err, Error::Type { tag: 0, .. }));
    assert!(!file.in_frame());

    file.begin_frame(800, 0, 0)?;
    assert!(matches!(file.add_frame_status_tag_u8(42, 1), Err(Error::Config(_))));

    file.begin_frame(1200, 0, 0)?;
    let long = "x".repeat(MAX_STATUS_STRING_LEN + 1);
    assert!(file.add_frame_status_tag_message(log, &long).is_err());

    assert_eq!(file.frame_count(), 1);
    file.end_file()
}

#[test]
fn test_second_image_in_frame_is_state_error() -> Result<()> {
    let mut file = memory_file()?;
    file.add_image_section(ImageLayout::raw(1, 2, 1, 8))?;
    file.begin_frame(0, 0, 0)?;
    file.add_frame_image(1, &[1, 2], 8)?;
    assert!(matches!(file.add_frame_image(1, &[1, 2], 8), Err(Error::State(_))));
    assert!(!file.in_frame());
    file.end_file()
}

#[test]
fn test_pixel_validation() -> Result<()> {
    let mut file = memory_file()?;
    file.add_image_section(ImageLayout::raw(1, 2, 2, 12))?;

    file.begin_frame(0, 0, 0)?;
    assert!(matches!(file.add_frame_image(1, &[0; 3], 12), Err(Error::Config(_))));

    file.begin_frame(0, 0, 0)?;
    assert!(matches!(file.add_frame_image(1, &[4096, 0, 0, 0], 12), Err(Error::Config(_))));

    // 16-bit samples are shifted down to the 12-bit layout.
    file.begin_frame(0, 0, 0)?;
    file.add_frame_image(1, &[0xFFFF, 0x0010, 0, 0x8000], 16)?;
    file.end_frame()?;
    file.end_file()
}

#[test]
fn test_end_file_is_idempotent() -> Result<()> {
    let mut file = memory_file()?;
    file.end_file()?;
    file.end_file()?;
    assert_eq!(file.state(), FileState::Finalized);
    Ok(())
}

#[test]
fn test_write_failure_poisons_file() -> Result<()> {
    let (sink, fail) = FailingSink::new();
    let mut file: AdvFile<FailingSink> = AdvFile::default();
    file.begin(sink)?;
    file.add_image_section(ImageLayout::raw(1, 2, 2, 8))?;

    file.begin_frame(0, 0, 0)?;
    file.add_frame_image(1, &[1, 2, 3, 4], 8)?;
    file.end_frame()?;

    file.begin_frame(400, 0, 0)?;
    file.add_frame_image(1, &[1, 2, 3, 4], 8)?;
    fail.store(true, Ordering::SeqCst);
    assert!(matches!(file.end_frame(), Err(Error::Io(_))));
    assert_eq!(file.frame_count(), 1);

    assert!(matches!(file.begin_frame(800, 0, 0), Err(Error::Io(_))));
    assert!(matches!(file.end_file(), Err(Error::Io(_))));
    assert_eq!(file.state(), FileState::Aborted);
    assert!(matches!(file.end_file(), Err(Error::State(_))));
    Ok(())
}

#[test]
fn test_end_file_failure_leaves_file_incomplete() -> Result<()> {
    let (sink, fail) = FailingSink::new();
    let mut file: AdvFile<FailingSink> = AdvFile::default();
    file.begin(sink)?;
    file.add_image_section(ImageLayout::raw(1, 2, 2, 8))?;
    for k in 0..3 {
        file.begin_frame(k * 400, 0, 0)?;
        file.add_frame_image(1, &[1, 2, 3, 4], 8)?;
        file.end_frame()?;
    }
    let frames_end = file.sink().map(Sink::position).unwrap();

    fail.store(true, Ordering::SeqCst);
    assert!(matches!(file.end_file(), Err(Error::Io(_))));
    assert_eq!(file.state(), FileState::Aborted);
    assert!(matches!(file.end_file(), Err(Error::State(_))));

    let bytes = file.into_sink().unwrap().inner.into_bytes();
    assert_eq!(bytes.len() as u64, frames_end);
    assert_eq!(bytes[STATE_OFFSET], RECORDING_FLAG);
    Ok(())
}

#[test]
fn test_close_failure_after_flag_keeps_file_finalized() -> Result<()> {
    let (mut sink, _) = FailingSink::new();
    sink.fail_close = true;
    let mut file: AdvFile<FailingSink> = AdvFile::default();
    file.begin(sink)?;
    file.add_image_section(ImageLayout::raw(1, 2, 2, 8))?;
    file.begin_frame(0, 0, 0)?;
    file.add_frame_image(1, &[1, 2, 3, 4], 8)?;
    file.end_frame()?;
    let frames_end = file.sink().map(Sink::position).unwrap();

    assert!(matches!(file.end_file(), Err(Error::Io(_))));
    assert_eq!(file.state(), FileState::Finalized);
    file.end_file()?;

    let bytes = file.into_sink().unwrap().inner.into_bytes();
    assert_eq!(bytes.len() as u64, frames_end + 4 + 12);
    assert_eq!(bytes[STATE_OFFSET], FINALIZED_FLAG);
    let header = FileHeader::parse(&bytes)?;
    assert!(header.finalized);
    assert_eq!(header.index_pos, frames_end);
    Ok(())
}

#[test]
fn test_buffer_capacity_before_open() -> Result<()> {
    let temp = NamedTempFile::new()?;
    let mut file = AdvFile::new();
    file.set_buffer_capacity(64)?;
    file.set_compression_level(9)?;
    file.begin_file(temp.path())?;
    assert!(matches!(file.set_buffer_capacity(128), Err(Error::Config(_))));
    assert_eq!(file.path(), Some(temp.path()));
    file.end_file()
}
