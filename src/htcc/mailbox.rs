//! Hand-off of timestamps from the HTCC thread to the capture thread.

use std::sync::Arc;

use parking_lot::Mutex;

use super::state::{HtccMessage, StateKind, SyncConfig, SyncState};
use super::synchronizer::{HtccSynchronizer, SyncStats};

/// Single-slot mailbox holding only the most recent message.
#[derive(Debug, Default)]
pub struct TimestampMailbox {
    slot: Mutex<Option<HtccMessage>>,
}

impl TimestampMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot with `message`.
    pub fn publish(&self, message: HtccMessage) {
        *self.slot.lock() = Some(message);
    }

    /// Copy of the latest message, leaving it in place.
    pub fn latest(&self) -> Option<HtccMessage> {
        *self.slot.lock()
    }

    /// Take the latest message, emptying the slot.
    pub fn take(&self) -> Option<HtccMessage> {
        self.slot.lock().take()
    }
}

/// Thread-safe synchronizer that publishes every output to a mailbox.
///
/// Clones share the same automaton and mailbox; events from any clone are
/// processed one at a time.
#[derive(Clone, Debug, Default)]
pub struct SharedSynchronizer {
    inner: Arc<Mutex<HtccSynchronizer>>,
    mailbox: Arc<TimestampMailbox>,
}

impl SharedSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HtccSynchronizer::new(config))),
            mailbox: Arc::new(TimestampMailbox::new()),
        }
    }

    pub fn receive_packet(&self, bytes: &[u8]) -> Option<HtccMessage> {
        let mut sync = self.inner.lock();
        let message = sync.receive_packet(bytes);
        if let Some(message) = message {
            self.mailbox.publish(message);
        }
        message
    }

    pub fn process_one_second_tick(&self) -> Option<HtccMessage> {
        let mut sync = self.inner.lock();
        let message = sync.process_one_second_tick();
        if let Some(message) = message {
            self.mailbox.publish(message);
        }
        message
    }

    /// The mailbox consumers read from.
    pub fn mailbox(&self) -> Arc<TimestampMailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn state(&self) -> SyncState {
        self.inner.lock().state()
    }

    pub fn kind(&self) -> StateKind {
        self.inner.lock().kind()
    }

    pub fn stats(&self) -> SyncStats {
        self.inner.lock().stats()
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }
}
