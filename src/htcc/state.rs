//! HTCC synchronization automaton.
//!
//! The automaton is a plain value plus a pure transition function, so every
//! transition can be driven and inspected directly.

use std::fmt;

use crate::core::Ticks;
use crate::util::{Error, Result};

/// Quality of an emitted timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Validity {
    /// Locked to the hardware cadence.
    Valid,
    /// Signal lost or drifting; the timestamp is the best known value.
    Degraded,
    /// No lock has been achieved yet.
    NotSynchronized,
}

/// Timestamp produced by the synchronizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HtccMessage {
    pub timestamp: Ticks,
    pub validity: Validity,
}

impl HtccMessage {
    pub fn new(timestamp: Ticks, validity: Validity) -> Self {
        Self { timestamp, validity }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }
}

/// Expected marker cadence and the tolerance around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    cadence_ticks: Ticks,
    tolerance_ticks: Ticks,
}

impl Default for SyncConfig {
    /// 40 ms cadence (25 fps PAL) with 2 ms tolerance.
    fn default() -> Self {
        Self {
            cadence_ticks: 400,
            tolerance_ticks: 20,
        }
    }
}

impl SyncConfig {
    /// Tolerance must stay below half the cadence so cadence multiples
    /// cannot be confused.
    pub fn new(cadence_ticks: Ticks, tolerance_ticks: Ticks) -> Result<Self> {
        if cadence_ticks <= 0 {
            return Err(Error::config(format!("cadence must be positive, got {}", cadence_ticks)));
        }
        if tolerance_ticks < 0 || tolerance_ticks.saturating_mul(2) >= cadence_ticks {
            return Err(Error::config(format!(
                "tolerance {} must be in 0..{} for cadence {}",
                tolerance_ticks,
                (cadence_ticks + 1) / 2,
                cadence_ticks
            )));
        }
        Ok(Self { cadence_ticks, tolerance_ticks })
    }

    #[inline]
    pub fn cadence_ticks(&self) -> Ticks {
        self.cadence_ticks
    }

    #[inline]
    pub fn tolerance_ticks(&self) -> Ticks {
        self.tolerance_ticks
    }

    /// Whether `interval` is one cadence, within tolerance.
    pub fn matches_cadence(&self, interval: Ticks) -> bool {
        (interval.saturating_sub(self.cadence_ticks)).abs() <= self.tolerance_ticks
    }

    /// Whether `interval` is a positive whole number of cadences, within tolerance.
    pub fn on_cadence_grid(&self, interval: Ticks) -> bool {
        if interval <= 0 {
            return false;
        }
        let k = interval.saturating_add(self.cadence_ticks / 2) / self.cadence_ticks;
        k >= 1 && (interval - k.saturating_mul(self.cadence_ticks)).abs() <= self.tolerance_ticks
    }
}

/// Input to the automaton.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// A valid timing marker arrived.
    Marker(Ticks),
    /// The once-per-second host heartbeat.
    Heartbeat,
}

/// Discriminant of [`SyncState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    Uninitialized,
    WaitingForFirstFrame,
    WaitingForSecondFrame,
    Synchronized,
    Resynchronizing,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Automaton state with the reference data each state needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Uninitialized,
    /// First marker seen.
    WaitingForFirstFrame { reference: Ticks },
    /// A marker pair failed the cadence check; `reference` is the latest marker.
    WaitingForSecondFrame { reference: Ticks },
    /// Locked. `seen` records whether a marker arrived after the lock was
    /// taken and since the last heartbeat; the locking marker does not count.
    Synchronized { last: Ticks, seen: bool },
    /// Lock lost. `last` is the most recent timestamp handed out.
    Resynchronizing { reference: Option<Ticks>, last: Ticks },
}

impl SyncState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Uninitialized => StateKind::Uninitialized,
            Self::WaitingForFirstFrame { .. } => StateKind::WaitingForFirstFrame,
            Self::WaitingForSecondFrame { .. } => StateKind::WaitingForSecondFrame,
            Self::Synchronized { .. } => StateKind::Synchronized,
            Self::Resynchronizing { .. } => StateKind::Resynchronizing,
        }
    }
}

/// Advance the automaton by one event.
pub fn step(state: SyncState, event: SyncEvent, config: &SyncConfig) -> (SyncState, Option<HtccMessage>) {
    use SyncEvent::{Heartbeat, Marker};
    use SyncState::*;

    match (state, event) {
        (Uninitialized, Marker(t)) => (WaitingForFirstFrame { reference: t }, None),
        (Uninitialized, Heartbeat) => (Uninitialized, None),

        (WaitingForFirstFrame { reference } | WaitingForSecondFrame { reference }, Marker(t)) => {
            if config.matches_cadence(t.saturating_sub(reference)) {
                (
                    Synchronized { last: t, seen: false },
                    Some(HtccMessage::new(t, Validity::Valid)),
                )
            } else {
                (WaitingForSecondFrame { reference: t }, None)
            }
        }
        (WaitingForFirstFrame { reference } | WaitingForSecondFrame { reference }, Heartbeat) => (
            state,
            Some(HtccMessage::new(reference, Validity::NotSynchronized)),
        ),

        (Synchronized { last, .. }, Marker(t)) => {
            if config.on_cadence_grid(t.saturating_sub(last)) {
                (
                    Synchronized { last: t, seen: true },
                    Some(HtccMessage::new(t, Validity::Valid)),
                )
            } else {
                (
                    Resynchronizing { reference: Some(t), last: t },
                    Some(HtccMessage::new(t, Validity::Degraded)),
                )
            }
        }
        (Synchronized { last, seen: true }, Heartbeat) => (Synchronized { last, seen: false }, None),
        (Synchronized { last, seen: false }, Heartbeat) => (
            Resynchronizing { reference: None, last },
            Some(HtccMessage::new(last, Validity::Degraded)),
        ),

        (Resynchronizing { reference, .. }, Marker(t)) => match reference {
            Some(r) if config.matches_cadence(t.saturating_sub(r)) => (
                Synchronized { last: t, seen: false },
                Some(HtccMessage::new(t, Validity::Valid)),
            ),
            _ => (
                Resynchronizing { reference: Some(t), last: t },
                Some(HtccMessage::new(t, Validity::Degraded)),
            ),
        },
        (Resynchronizing { last, .. }, Heartbeat) => {
            (state, Some(HtccMessage::new(last, Validity::Degraded)))
        }
    }
}
