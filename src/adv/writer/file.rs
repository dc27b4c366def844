//! ADV file writer (recording lifecycle).
//!
//! `AdvFile` owns the schema, the open frame context and the frame index,
//! and drives the sink. The header is written as a placeholder by
//! `begin_file` and patched by `end_file`; the finalized flag is the very
//! last byte written, so an interrupted recording is always recognisable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, info, trace, warn};

use super::constants::{
    MAX_FRAME_RECORD_LEN, MAX_IMAGE_LAYOUTS, RECORDER_NAME, TAG_ADV_VERSION, TAG_COMPRESSION,
    TAG_RECORDER,
};
use super::encoder::{normalize_pixels, EncodedImage, FrameEncoder, FrameKind};
use super::index::FrameIndex;
use super::layout::{write_layout_directory, DeltaBaseline, ImageEncoding, ImageLayout};
use super::status::{
    write_status_directory, FrameStatus, StatusTagDefinition, StatusTagType, StatusValue,
    MAX_STATUS_STRING_LEN, MAX_STATUS_TAGS,
};
use super::stream::{FileSink, Sink, DEFAULT_BUFFER_CAPACITY};
use crate::adv::format::{FileHeader, CURRENT_VERSION, FINALIZED_FLAG, FRAME_MARKER, STATE_OFFSET};
use crate::core::{Compressor, FileTags, Ticks, ZlibCompressor};
use crate::util::{Error, Result};

/// Recording state of an [`AdvFile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    /// Constructed, no sink yet.
    Idle,
    /// Sink open, frames may be written.
    Recording,
    /// `end_file` succeeded.
    Finalized,
    /// Finalization failed; the file is left incomplete.
    Aborted,
}

/// Frame context between `begin_frame` and `end_frame`.
struct OpenFrame {
    frame_no: u32,
    timestamp: Ticks,
    elapsed: u32,
    exposure: u32,
    status: FrameStatus,
    image: Option<PendingImage>,
}

struct PendingImage {
    slot: usize,
    encoded: EncodedImage,
    pixels: Vec<u16>,
}

/// Delta baseline bookkeeping for one layout.
#[derive(Default)]
struct BaselineSlot {
    pixels: Option<Vec<u16>>,
    images_written: u32,
}

/// ADV file writer.
///
/// Generic over the [`Sink`] so recordings can target a file or memory.
pub struct AdvFile<S: Sink = FileSink> {
    sink: Option<S>,
    path: Option<PathBuf>,
    state: FileState,
    poisoned: bool,
    tags: FileTags,
    layouts: Vec<ImageLayout>,
    baselines: Vec<BaselineSlot>,
    status_tags: Vec<StatusTagDefinition>,
    schema_pos: Option<u64>,
    index: FrameIndex,
    frame: Option<OpenFrame>,
    encoder: FrameEncoder,
    buffer_capacity: usize,
}

impl<S: Sink> Default for AdvFile<S> {
    fn default() -> Self {
        Self {
            sink: None,
            path: None,
            state: FileState::Idle,
            poisoned: false,
            tags: FileTags::new(),
            layouts: Vec::new(),
            baselines: Vec::new(),
            status_tags: Vec::new(),
            schema_pos: None,
            index: FrameIndex::new(),
            frame: None,
            encoder: FrameEncoder::new(Arc::new(ZlibCompressor::default())),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl AdvFile<FileSink> {
    /// Create an idle writer targeting a file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the file at `path` and reserve the header.
    pub fn begin_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.require_idle()?;
        let path = path.as_ref();
        let sink = FileSink::with_capacity(path, self.buffer_capacity)?;
        self.path = Some(path.to_path_buf());
        self.begin(sink).inspect_err(|_| self.path = None)
    }
}

impl<S: Sink> AdvFile<S> {
    /// Start recording into `sink` and reserve the header.
    pub fn begin(&mut self, mut sink: S) -> Result<()> {
        self.require_idle()?;
        sink.write_bytes(&FileHeader::placeholder().to_bytes())?;
        self.sink = Some(sink);
        self.state = FileState::Recording;
        debug!(path = ?self.path, "ADV recording started");
        Ok(())
    }

    fn require_idle(&self) -> Result<()> {
        if self.state != FileState::Idle {
            return Err(Error::state(format!("file already started ({:?})", self.state)));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Use zlib at `level` (0-9) for layouts with generic compression.
    pub fn set_compression_level(&mut self, level: u32) -> Result<()> {
        self.set_compressor(Arc::new(ZlibCompressor::new(level)))
    }

    /// Replace the compressor strategy.
    pub fn set_compressor(&mut self, compressor: Arc<dyn Compressor>) -> Result<()> {
        self.require_schema_open("compressor")?;
        self.encoder = FrameEncoder::new(compressor);
        Ok(())
    }

    /// Set the write buffer size of the file sink created by `begin_file`.
    pub fn set_buffer_capacity(&mut self, capacity: usize) -> Result<()> {
        if self.state != FileState::Idle {
            return Err(Error::config("buffer capacity must be set before the file is opened"));
        }
        self.buffer_capacity = capacity.max(1);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Schema
    // -------------------------------------------------------------------------

    fn require_schema_open(&self, what: &str) -> Result<()> {
        let closed = self.schema_pos.is_some()
            || matches!(self.state, FileState::Finalized | FileState::Aborted);
        if closed {
            return Err(Error::config(format!("cannot change {}: schema is closed", what)));
        }
        Ok(())
    }

    /// Insert or overwrite a file tag.
    pub fn add_file_tag(&mut self, name: &str, value: &str) -> Result<()> {
        self.require_schema_open("file tags")?;
        self.tags.set(name, value)
    }

    /// Register an image layout.
    pub fn add_image_section(&mut self, layout: ImageLayout) -> Result<()> {
        self.require_schema_open("image sections")?;
        layout.validate()?;
        if self.layout_slot(layout.id).is_some() {
            return Err(Error::config(format!("image layout {} already registered", layout.id)));
        }
        if self.layouts.len() >= MAX_IMAGE_LAYOUTS {
            return Err(Error::config("too many image layouts"));
        }
        debug!(id = layout.id, width = layout.width, height = layout.height, bpp = layout.bpp, "image section added");
        self.layouts.push(layout);
        self.baselines.push(BaselineSlot::default());
        Ok(())
    }

    /// Register a status tag and return its index.
    pub fn add_status_tag(&mut self, name: &str, tag_type: StatusTagType) -> Result<u8> {
        self.require_schema_open("status tags")?;
        if name.is_empty() || name.len() > MAX_STATUS_STRING_LEN {
            return Err(Error::config(format!("invalid status tag name {:?}", name)));
        }
        if self.status_tags.iter().any(|d| d.name == name) {
            return Err(Error::config(format!("status tag {:?} already registered", name)));
        }
        if self.status_tags.len() >= MAX_STATUS_TAGS {
            return Err(Error::config("too many status tags"));
        }
        let index = self.status_tags.len() as u8;
        self.status_tags.push(StatusTagDefinition {
            index,
            name: name.to_string(),
            tag_type,
        });
        Ok(index)
    }

    fn layout_slot(&self, id: u8) -> Option<usize> {
        self.layouts.iter().position(|l| l.id == id)
    }

    fn apply_default_tags(&mut self) -> Result<()> {
        if !self.tags.contains(TAG_ADV_VERSION) {
            self.tags.set(TAG_ADV_VERSION, CURRENT_VERSION.to_string())?;
        }
        if !self.tags.contains(TAG_RECORDER) {
            self.tags.set(TAG_RECORDER, RECORDER_NAME)?;
        }
        if !self.tags.contains(TAG_COMPRESSION) {
            let name = self.encoder.compressor().name().to_string();
            self.tags.set(TAG_COMPRESSION, name)?;
        }
        Ok(())
    }

    /// Write file tags and both directories; the schema is closed afterwards.
    fn write_schema(&mut self) -> Result<()> {
        self.apply_default_tags()?;

        let mut buf = Vec::new();
        self.tags.serialize(&mut buf)?;
        write_layout_directory(&mut buf, &self.layouts)?;
        write_status_directory(&mut buf, &self.status_tags)?;

        let pos = self.sink_position()?;
        self.write_to_sink(&buf)?;
        self.schema_pos = Some(pos);
        debug!(
            pos,
            layouts = self.layouts.len(),
            status_tags = self.status_tags.len(),
            "schema closed"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Sink helpers
    // -------------------------------------------------------------------------

    fn sink_mut(&mut self) -> Result<&mut S> {
        self.sink.as_mut().ok_or_else(|| Error::state("no sink open"))
    }

    fn sink_position(&self) -> Result<u64> {
        self.sink
            .as_ref()
            .map(Sink::position)
            .ok_or_else(|| Error::state("no sink open"))
    }

    /// Write through the sink; any failure poisons the file.
    fn write_to_sink(&mut self, data: &[u8]) -> Result<()> {
        let result = self.sink_mut()?.write_bytes(data);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn poisoned_error() -> Error {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "an earlier sink write failed; the recording cannot continue",
        ))
    }

    // -------------------------------------------------------------------------
    // Frames
    // -------------------------------------------------------------------------

    /// Drop the open frame when `result` is an error.
    fn abort_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if let Some(frame) = self.frame.take() {
                warn!(frame = frame.frame_no, error = %e, "frame aborted");
            }
        }
        result
    }

    /// Open a frame context.
    pub fn begin_frame(&mut self, timestamp: Ticks, elapsed: u32, exposure: u32) -> Result<()> {
        let result = self.try_begin_frame(timestamp, elapsed, exposure);
        self.abort_on_error(result)
    }

    fn try_begin_frame(&mut self, timestamp: Ticks, elapsed: u32, exposure: u32) -> Result<()> {
        if self.state != FileState::Recording {
            return Err(Error::state(format!("cannot begin a frame while {:?}", self.state)));
        }
        if let Some(frame) = &self.frame {
            return Err(Error::state(format!("frame {} is still open", frame.frame_no)));
        }
        if self.poisoned {
            return Err(Self::poisoned_error());
        }
        self.sink_mut()?.check_ready()?;
        if self.schema_pos.is_none() {
            self.write_schema()?;
        }

        self.frame = Some(OpenFrame {
            frame_no: self.index.len() as u32,
            timestamp,
            elapsed,
            exposure,
            status: FrameStatus::new(),
            image: None,
        });
        Ok(())
    }

    fn set_status(&mut self, tag: u8, value: StatusValue) -> Result<()> {
        let result = self.try_set_status(tag, value);
        self.abort_on_error(result)
    }

    fn try_set_status(&mut self, tag: u8, value: StatusValue) -> Result<()> {
        let frame = self.frame.as_mut().ok_or_else(|| Error::state("no open frame"))?;
        let def = self
            .status_tags
            .get(tag as usize)
            .ok_or_else(|| Error::config(format!("status tag {} is not declared", tag)))?;
        frame.status.set(def, value)
    }

    pub fn add_frame_status_tag_u8(&mut self, tag: u8, value: u8) -> Result<()> {
        self.set_status(tag, StatusValue::UInt8(value))
    }

    pub fn add_frame_status_tag_u16(&mut self, tag: u8, value: u16) -> Result<()> {
        self.set_status(tag, StatusValue::UInt16(value))
    }

    pub fn add_frame_status_tag_u32(&mut self, tag: u8, value: u32) -> Result<()> {
        self.set_status(tag, StatusValue::UInt32(value))
    }

    pub fn add_frame_status_tag_u64(&mut self, tag: u8, value: u64) -> Result<()> {
        self.set_status(tag, StatusValue::UInt64(value))
    }

    pub fn add_frame_status_tag_real(&mut self, tag: u8, value: f32) -> Result<()> {
        self.set_status(tag, StatusValue::Real(value))
    }

    pub fn add_frame_status_tag_string(&mut self, tag: u8, value: &str) -> Result<()> {
        self.set_status(tag, StatusValue::FixedString(value.to_string()))
    }

    /// Append one message to a List status tag.
    pub fn add_frame_status_tag_message(&mut self, tag: u8, message: &str) -> Result<()> {
        let result = self.try_append_message(tag, message);
        self.abort_on_error(result)
    }

    fn try_append_message(&mut self, tag: u8, message: &str) -> Result<()> {
        let frame = self.frame.as_mut().ok_or_else(|| Error::state("no open frame"))?;
        let def = self
            .status_tags
            .get(tag as usize)
            .ok_or_else(|| Error::config(format!("status tag {} is not declared", tag)))?;
        frame.status.append_message(def, message)
    }

    /// Encode the frame image for `layout_id`.
    ///
    /// `pixels_bpp` is the significant depth of the supplied samples.
    pub fn add_frame_image(&mut self, layout_id: u8, pixels: &[u16], pixels_bpp: u8) -> Result<()> {
        let result = self.try_add_frame_image(layout_id, pixels, pixels_bpp);
        self.abort_on_error(result)
    }

    fn try_add_frame_image(&mut self, layout_id: u8, pixels: &[u16], pixels_bpp: u8) -> Result<()> {
        let frame = self.frame.as_mut().ok_or_else(|| Error::state("no open frame"))?;
        if frame.image.is_some() {
            return Err(Error::state(format!("frame {} already has an image", frame.frame_no)));
        }
        let slot = self
            .layouts
            .iter()
            .position(|l| l.id == layout_id)
            .ok_or_else(|| Error::config(format!("image layout {} is not registered", layout_id)))?;
        let layout = &self.layouts[slot];
        let baseline = &self.baselines[slot];

        let pixels = normalize_pixels(layout, pixels, pixels_bpp)?;
        let interval_due = layout.keyframe_interval > 0
            && baseline.images_written % layout.keyframe_interval == 0;
        let reference = if interval_due { None } else { baseline.pixels.as_deref() };

        let encoded = self.encoder.encode(layout, &pixels, reference)?;
        trace!(
            frame = frame.frame_no,
            layout = layout_id,
            kind = ?encoded.kind,
            compressed = encoded.compressed,
            stored = encoded.payload.len(),
            "image encoded"
        );
        frame.image = Some(PendingImage { slot, encoded, pixels });
        Ok(())
    }

    /// Serialize the open frame and record it in the index.
    pub fn end_frame(&mut self) -> Result<()> {
        let frame = self.frame.take().ok_or_else(|| Error::state("no open frame"))?;
        let frame_no = frame.frame_no;
        let result = self.commit_frame(frame);
        if let Err(e) = &result {
            warn!(frame = frame_no, error = %e, "frame aborted");
        }
        result
    }

    fn commit_frame(&mut self, frame: OpenFrame) -> Result<()> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(FRAME_MARKER)?;
        buf.write_i64::<LittleEndian>(frame.timestamp)?;
        buf.write_u32::<LittleEndian>(frame.elapsed)?;
        buf.write_u32::<LittleEndian>(frame.exposure)?;
        frame.status.serialize(&mut buf)?;
        match &frame.image {
            Some(image) => {
                buf.write_u8(1)?;
                image.encoded.write(&mut buf)?;
            }
            None => buf.write_u8(0)?,
        }
        if buf.len() > MAX_FRAME_RECORD_LEN {
            return Err(Error::config(format!("frame record of {} bytes is too large", buf.len())));
        }

        let offset = self.sink_position()?;
        self.write_to_sink(&buf)?;
        self.index.append(frame.frame_no, offset, buf.len() as u32)?;

        if let Some(image) = frame.image {
            let layout = &self.layouts[image.slot];
            let slot = &mut self.baselines[image.slot];
            let replace = match layout.encoding {
                ImageEncoding::Raw => false,
                ImageEncoding::DeltaWithSign => {
                    image.encoded.kind == FrameKind::Keyframe
                        || layout.baseline == DeltaBaseline::PreviousFrame
                }
            };
            if replace {
                slot.pixels = Some(image.pixels);
            }
            slot.images_written += 1;
        }

        trace!(frame = frame.frame_no, offset, length = buf.len(), "frame committed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Finalization
    // -------------------------------------------------------------------------

    /// Write the index trailer, patch the header and close the sink.
    ///
    /// A failure before the finalized flag is written truncates the sink to
    /// the last frame and aborts the file. A failure to close after the flag
    /// is returned, but the file stays finalized. Calling again after either
    /// is a no-op.
    pub fn end_file(&mut self) -> Result<()> {
        match self.state {
            FileState::Finalized => return Ok(()),
            FileState::Idle => return Err(Error::state("no file open")),
            FileState::Aborted => return Err(Error::state("file was aborted")),
            FileState::Recording => {}
        }
        if let Some(frame) = self.frame.take() {
            warn!(frame = frame.frame_no, "frame aborted by end_file");
            return Err(Error::state(format!("frame {} is still open", frame.frame_no)));
        }
        if self.poisoned {
            self.state = FileState::Aborted;
            warn!(path = ?self.path, "sink failed earlier; file left incomplete");
            return Err(Self::poisoned_error());
        }

        if self.schema_pos.is_none() {
            self.write_schema().inspect_err(|_| self.state = FileState::Aborted)?;
        }

        let frames_end = self.sink_position()?;
        if let Err(e) = self.finalize(frames_end) {
            self.state = FileState::Aborted;
            if let Some(sink) = self.sink.as_mut() {
                match sink.truncate(frames_end) {
                    Ok(()) => {
                        let _ = sink.close();
                    }
                    Err(te) => warn!(path = ?self.path, error = %te, "partial trailer could not be truncated"),
                }
            }
            warn!(path = ?self.path, error = %e, "finalization failed; file left incomplete");
            return Err(e);
        }

        // The finalized flag is on disk; a failed close cannot take it back.
        self.state = FileState::Finalized;
        if let Err(e) = self.sink_mut().and_then(|sink| sink.close()) {
            warn!(path = ?self.path, error = %e, "ADV file finalized but closing the sink failed");
            return Err(e);
        }
        info!(path = ?self.path, frames = self.index.len(), "ADV file finalized");
        Ok(())
    }

    fn finalize(&mut self, frames_end: u64) -> Result<()> {
        let mut trailer = Vec::new();
        self.index.serialize(&mut trailer)?;

        let header = FileHeader {
            version: CURRENT_VERSION,
            finalized: false,
            frame_count: self.index.len() as u32,
            layout_count: self.layouts.len() as u8,
            status_tag_count: self.status_tags.len() as u8,
            schema_pos: self.schema_pos.unwrap_or(frames_end),
            index_pos: frames_end,
        };

        let sink = self.sink_mut()?;
        sink.write_bytes(&trailer)?;
        sink.flush()?;
        sink.seek(0)?;
        sink.write_bytes(&header.to_bytes())?;
        sink.flush()?;
        sink.seek(STATE_OFFSET as u64)?;
        sink.write_bytes(&[FINALIZED_FLAG])?;
        sink.flush()
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Number of committed frames.
    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.index.len() as u32
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.state == FileState::Recording
    }

    #[inline]
    pub fn state(&self) -> FileState {
        self.state
    }

    /// Whether a frame context is open.
    #[inline]
    pub fn in_frame(&self) -> bool {
        self.frame.is_some()
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    pub fn layouts(&self) -> &[ImageLayout] {
        &self.layouts
    }

    pub fn status_tags(&self) -> &[StatusTagDefinition] {
        &self.status_tags
    }

    pub fn file_tags(&self) -> &FileTags {
        &self.tags
    }

    /// Path given to `begin_file`, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Borrow the sink.
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// Release the sink, leaving the writer without one.
    pub fn into_sink(mut self) -> Option<S> {
        self.sink.take()
    }
}

impl<S: Sink> Drop for AdvFile<S> {
    fn drop(&mut self) {
        if self.state != FileState::Recording {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            warn!(
                path = ?self.path,
                frames = self.index.len(),
                "ADV file dropped without end_file; recording left incomplete"
            );
            let _ = sink.close();
        }
    }
}
