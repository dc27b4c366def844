//! ADV container format.
//!
//! A recording is a single file, written front to back and patched once at
//! the end:
//!
//! ```text
//! +----------------------------+  0
//! | Header (32 bytes)          |  magic "FSTF", version, state flag,
//! |                            |  counts, schema and index offsets
//! +----------------------------+  schema_offset
//! | FileTags                   |
//! | ImageSectionDirectory      |  written when the schema closes
//! | StatusSectionDirectory     |  (first frame, or end of file)
//! +----------------------------+
//! | FrameRecord 0              |
//! | FrameRecord 1              |  marker, timestamp, status block,
//! | ...                        |  optional encoded image + CRC-32
//! +----------------------------+  index_offset
//! | FrameIndexTrailer          |  count, (offset u64, length u32)*
//! +----------------------------+
//! ```
//!
//! All integers are little-endian. The state flag in the header turns to
//! finalized only after the trailer is on disk.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::FileHeader;
pub use reader::{AdvFrame, AdvReader, VerifyReport};
pub use writer::{
    AdvFile, CompressionMode, DeltaBaseline, EncodedImage, FileSink, FileState, FrameEncoder,
    FrameIndex, FrameKind, FrameStatus, ImageEncoding, ImageLayout, IndexEntry, MemorySink, Sink,
    StatusTagDefinition, StatusTagType, StatusValue,
};
