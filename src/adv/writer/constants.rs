//! ADV writer constants.
//!
//! Default file tag names and values stamped into every recording unless
//! the caller sets them explicitly.

/// File tag carrying the container version.
pub const TAG_ADV_VERSION: &str = "ADV-VERSION";

/// File tag naming the software that wrote the file.
pub const TAG_RECORDER: &str = "RECORDER";

/// File tag naming the compressor strategy.
pub const TAG_COMPRESSION: &str = "COMPRESSION";

/// Recorder identification, including the build date.
pub(crate) const RECORDER_NAME: &str = concat!(
    "adv-rs ",
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("ADV_BUILD_DATE"),
    ")"
);

/// Largest frame record the index can address (length is a `u32`).
pub(crate) const MAX_FRAME_RECORD_LEN: usize = u32::MAX as usize;

/// Layout ids are `u8` and the directory count is a `u8`.
pub(crate) const MAX_IMAGE_LAYOUTS: usize = 255;
