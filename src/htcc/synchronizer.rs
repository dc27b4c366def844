//! Stateful wrapper around the synchronization automaton.

use tracing::{debug, trace};

use super::packet::MarkerPacket;
use super::state::{step, HtccMessage, StateKind, SyncConfig, SyncEvent, SyncState};

/// Counters kept by [`HtccSynchronizer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Valid timing markers processed.
    pub markers: u64,
    /// Packets that were not timing markers.
    pub ignored_packets: u64,
    pub heartbeats: u64,
    /// Times the automaton entered `Synchronized`.
    pub locks: u64,
    /// Times the automaton entered `Resynchronizing`.
    pub lock_losses: u64,
}

/// Turns raw HTCC packets and the host heartbeat into timestamps.
#[derive(Debug, Default)]
pub struct HtccSynchronizer {
    config: SyncConfig,
    state: SyncState,
    stats: SyncStats,
}

impl HtccSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            state: SyncState::Uninitialized,
            stats: SyncStats::default(),
        }
    }

    /// Handle one packet from the hardware source.
    pub fn receive_packet(&mut self, bytes: &[u8]) -> Option<HtccMessage> {
        match MarkerPacket::parse(bytes) {
            Some(marker) => {
                self.stats.markers += 1;
                self.apply(SyncEvent::Marker(marker.timestamp))
            }
            None => {
                self.stats.ignored_packets += 1;
                trace!(len = bytes.len(), "ignoring non-marker packet");
                None
            }
        }
    }

    /// Handle the once-per-second heartbeat.
    pub fn process_one_second_tick(&mut self) -> Option<HtccMessage> {
        self.stats.heartbeats += 1;
        self.apply(SyncEvent::Heartbeat)
    }

    fn apply(&mut self, event: SyncEvent) -> Option<HtccMessage> {
        let (next, message) = step(self.state, event, &self.config);
        let (from, to) = (self.state.kind(), next.kind());
        if from != to {
            self.finalise(from);
            self.initialise(to, &next);
        }
        self.state = next;
        message
    }

    /// Exit hook of a state kind.
    fn finalise(&mut self, kind: StateKind) {
        debug!(state = %kind, "leaving HTCC state");
    }

    /// Entry hook of a state kind.
    fn initialise(&mut self, kind: StateKind, state: &SyncState) {
        match kind {
            StateKind::Synchronized => self.stats.locks += 1,
            StateKind::Resynchronizing => self.stats.lock_losses += 1,
            _ => {}
        }
        debug!(state = ?state, "entering HTCC state");
    }

    /// Return to `Uninitialized`, dropping all reference data.
    pub fn reset(&mut self) {
        let kind = self.state.kind();
        if kind != StateKind::Uninitialized {
            self.finalise(kind);
        }
        self.state = SyncState::Uninitialized;
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    #[inline]
    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.kind() == StateKind::Synchronized
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }
}
