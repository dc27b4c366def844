//! Error types for the ADV library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ADV recording and read-back.
#[derive(Error, Debug)]
pub enum Error {
    /// Unregistered layout or status tag, or schema growth after capture started
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lifecycle violation (nested or missing BeginFrame/EndFrame/EndFile)
    #[error("Invalid state: {0}")]
    State(String),

    /// Status value does not match the declared tag type, or does not fit it
    #[error("Type mismatch for status tag {tag}: expected {expected}, got {actual}")]
    Type {
        tag: u8,
        expected: String,
        actual: String,
    },

    /// Out-of-order index append, checksum mismatch, inconsistent read-back
    #[error("Consistency check failed: {0}")]
    Consistency(String),

    /// Calendar field or tick value out of range
    #[error("Value out of range: {0}")]
    Range(String),

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid magic bytes at start of file
    #[error("Invalid ADV file: expected FSTF magic bytes")]
    InvalidMagic,

    /// Unsupported file format version
    #[error("Unsupported ADV version: {0}")]
    UnsupportedVersion(u16),

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// File was never finalized (aborted recording)
    #[error("File is incomplete: recording was not finalized")]
    Incomplete,

    /// Frame number out of bounds
    #[error("Frame {index} out of bounds (count: {count})")]
    FrameOutOfBounds { index: u64, count: u64 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a lifecycle/state error.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a consistency error.
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Create a range error.
    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Whether the error is a caller bug that only aborts the current frame.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::State(_) | Self::Type { .. }
        )
    }
}

/// Result type alias for ADV operations.
pub type Result<T> = std::result::Result<T, Error>;
