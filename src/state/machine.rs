//! Discrete state and the transition gate.
//!
//! [`StateMachine::update`] is the single serialization point for every
//! state change. The polling thread, host tick callbacks and direct host
//! events all funnel through it, and the atomic swap guarantees that a
//! change observed by several of them at once is emitted exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

// ============================================================================
// DiscreteState
// ============================================================================

/// Coarse-grained mode of the host application.
///
/// When several conditions hold at once the precedence is
/// `InReplaySegment > Paused > InSession > InMenu`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DiscreteState {
    /// Sentinel before the first detection.
    #[default]
    Unknown = 0,
    /// Outside any session.
    InMenu = 1,
    /// In an active or free-form session.
    InSession = 2,
    /// Watching a replay segment inside a session.
    InReplaySegment = 3,
    /// Session with a server context running at speed zero.
    Paused = 4,
}

impl DiscreteState {
    /// All states that can be observed on the wire.
    pub const OBSERVABLE: [Self; 4] = [
        Self::InMenu,
        Self::InSession,
        Self::InReplaySegment,
        Self::Paused,
    ];

    /// Returns the wire name of the state.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::InMenu => "InMenu",
            Self::InSession => "InSession",
            Self::InReplaySegment => "InReplaySegment",
            Self::Paused => "Paused",
        }
    }

    /// Returns `true` for the initial sentinel.
    #[inline]
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }

    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::InMenu,
            2 => Self::InSession,
            3 => Self::InReplaySegment,
            4 => Self::Paused,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DiscreteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscreteState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Unknown" => Ok(Self::Unknown),
            "InMenu" => Ok(Self::InMenu),
            "InSession" => Ok(Self::InSession),
            "InReplaySegment" => Ok(Self::InReplaySegment),
            "Paused" => Ok(Self::Paused),
            other => Err(Error::config(format!("unknown state name: {other}"))),
        }
    }
}

// ============================================================================
// StateTransition
// ============================================================================

/// A change from one state to a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// State before the change.
    pub previous: DiscreteState,
    /// State after the change. Never equal to `previous`.
    pub next: DiscreteState,
    /// Wall-clock time of the change, in Unix seconds.
    pub observed_at_unix_seconds: i64,
}

impl StateTransition {
    /// Creates a transition stamped with the current time.
    #[must_use]
    pub fn now(previous: DiscreteState, next: DiscreteState) -> Self {
        Self {
            previous,
            next,
            observed_at_unix_seconds: unix_now(),
        }
    }
}

/// Returns the current Unix time in whole seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// ============================================================================
// StateMachine
// ============================================================================

/// Callback invoked with each transition.
///
/// Runs synchronously on whichever thread observed the change, so it must
/// be fast and must not block.
pub type TransitionCallback = Arc<dyn Fn(&StateTransition) + Send + Sync>;

/// Holds the current state and fires on change.
pub struct StateMachine {
    /// Current state, as `DiscreteState as u8`.
    current: AtomicU8,
    /// Registered transition callback.
    callback: RwLock<Option<TransitionCallback>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current())
            .field("has_callback", &self.callback.read().is_some())
            .finish()
    }
}

impl StateMachine {
    /// Creates a machine in [`DiscreteState::Unknown`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: AtomicU8::new(DiscreteState::Unknown as u8),
            callback: RwLock::new(None),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn current(&self) -> DiscreteState {
        DiscreteState::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Registers the transition callback, replacing any previous one.
    pub fn set_transition_callback<F>(&self, callback: F)
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    /// Removes the transition callback.
    pub fn clear_transition_callback(&self) {
        *self.callback.write() = None;
    }

    /// Offers a candidate state.
    ///
    /// Stores it and fires the callback only if it differs from the current
    /// value. Offering `Unknown` is ignored: the sentinel is never re-entered.
    ///
    /// Returns the transition if one happened.
    ///
    /// Swaps are linearizable, but callbacks are not ordered with them: when
    /// two threads offer different candidates at once, their callbacks may
    /// run in the opposite order. [`current`](Self::current) is authoritative;
    /// a listener's last message can lag it until the next change.
    pub fn update(&self, candidate: DiscreteState) -> Option<StateTransition> {
        if candidate.is_unknown() {
            debug!("Ignoring Unknown candidate");
            return None;
        }

        if self.current.load(Ordering::Acquire) == candidate as u8 {
            return None;
        }

        let previous = DiscreteState::from_u8(self.current.swap(candidate as u8, Ordering::AcqRel));
        if previous == candidate {
            return None;
        }

        let transition = StateTransition::now(previous, candidate);
        info!(from = %previous, to = %candidate, "State changed");

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(&transition);
        }

        Some(transition)
    }
}

// ============================================================================
// Tests
// ============================================================================
