//! HTCC (Hardware Time Code Capture) timestamp synchronization.
//!
//! The hardware sends timing-marker packets at the video cadence; the host
//! adds a heartbeat once per wall-clock second. [`HtccSynchronizer`] turns
//! both into [`HtccMessage`]s carrying the authoritative timestamp and its
//! [`Validity`]. [`SharedSynchronizer`] serializes events from several
//! threads and leaves the newest message in a [`TimestampMailbox`] for the
//! capture loop.

mod mailbox;
mod packet;
mod state;
mod synchronizer;

pub use mailbox::{SharedSynchronizer, TimestampMailbox};
pub use packet::{MarkerPacket, MARKER_KIND, MARKER_PACKET_LEN, SYNC_BYTE};
pub use state::{step, HtccMessage, StateKind, SyncConfig, SyncEvent, SyncState, Validity};
pub use synchronizer::{HtccSynchronizer, SyncStats};
