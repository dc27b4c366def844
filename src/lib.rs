//! # ADV
//!
//! Recording of astronomical video into the ADV container, with frame
//! timestamps verified against an HTCC (Hardware Time Code Capture) device.
//!
//! ## Modules
//!
//! - [`util`] - Errors
//! - [`core`] - Time ticks, file tags, compression and checksums
//! - [`adv`] - Container writer ([`AdvFile`]) and reader ([`AdvReader`])
//! - [`htcc`] - Timestamp synchronization state machine
//!
//! ## Example
//!
//! ```ignore
//! use adv::prelude::*;
//!
//! let mut file = AdvFile::new();
//! file.begin_file("occultation.adv")?;
//! file.add_image_section(ImageLayout::raw(1, 640, 480, 16))?;
//! let gain = file.add_status_tag("Gain", StatusTagType::Real)?;
//!
//! file.begin_frame(now_ticks(), 0, 400)?;
//! file.add_frame_status_tag_real(gain, 3.5)?;
//! file.add_frame_image(1, &pixels, 16)?;
//! file.end_frame()?;
//!
//! file.end_file()?;
//! ```

pub mod adv;
pub mod core;
pub mod htcc;
pub mod util;

// Re-export commonly used types
pub use adv::{AdvFile, AdvReader};
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adv::{
        AdvFile, AdvFrame, AdvReader, CompressionMode, DeltaBaseline, ImageLayout, StatusTagType,
        StatusValue,
    };
    pub use crate::core::{from_ticks, now_ticks, to_ticks, Ticks};
    pub use crate::htcc::{HtccMessage, HtccSynchronizer, SharedSynchronizer, SyncConfig, Validity};
    pub use crate::util::{Error, Result};
}
