//! ADV format writer implementation.
//!
//! Split by concern: sinks, schema pieces (layouts and status tags), frame
//! payload encoding, the frame index, and the `AdvFile` lifecycle on top.

mod constants;
mod encoder;
mod file;
mod index;
mod layout;
mod status;
mod stream;

pub use constants::{TAG_ADV_VERSION, TAG_COMPRESSION, TAG_RECORDER};
pub use encoder::{
    decode_delta, encode_delta, normalize_pixels, pack_samples, unpack_samples, EncodedImage,
    FrameEncoder, FrameKind,
};
pub use file::{AdvFile, FileState};
pub use index::{FrameIndex, IndexEntry};
pub use layout::{CompressionMode, DeltaBaseline, ImageEncoding, ImageLayout};
pub use status::{
    FrameStatus, StatusTagDefinition, StatusTagType, StatusValue, MAX_STATUS_LIST_LEN,
    MAX_STATUS_STRING_LEN, MAX_STATUS_TAGS,
};
pub use stream::{FileSink, MemorySink, Sink, DEFAULT_BUFFER_CAPACITY};

pub(crate) use layout::parse_layout_directory;
pub(crate) use status::parse_status_directory;

#[cfg(test)]
mod tests;
