//! Core layer - leaf utilities shared by the container and the synchronizer.
//!
//! This module provides:
//! - [`Ticks`] and calendar conversions for the ADV time domain
//! - [`FileTags`] - Ordered file-level metadata
//! - [`Compressor`] - Pluggable payload compression
//! - [`crc32`] - Payload integrity checks

mod checksum;
mod compression;
mod tags;
mod ticks;

pub use checksum::{crc32, verify_crc32};
pub use compression::{compress_if_smaller, Compressor, ZlibCompressor, DEFAULT_COMPRESSION_LEVEL};
pub use tags::FileTags;
pub use ticks::{
    from_high_res_system_time, from_ticks, now_ticks, to_ticks, CalendarTime, Ticks,
    DOMAIN_ZERO_UNIX_SECONDS, MICROS_PER_TICK, TICKS_PER_SECOND,
};
