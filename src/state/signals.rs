//! Host signals and state detection.
//!
//! The host exposes four raw values. [`detect`] turns them into a
//! [`DiscreteState`] without touching any shared state.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;

use super::machine::DiscreteState;

// ============================================================================
// HostSignals
// ============================================================================

/// Raw values sampled from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostSignals {
    /// Host is inside a session (match, free play, replay viewer).
    pub in_session: bool,
    /// A replay segment is playing.
    pub in_replay_segment: bool,
    /// Session speed. Exactly `0.0` means paused.
    pub session_speed: f32,
    /// A server-side session context exists.
    pub has_active_server_context: bool,
}

impl Default for HostSignals {
    fn default() -> Self {
        Self {
            in_session: false,
            in_replay_segment: false,
            session_speed: 1.0,
            has_active_server_context: false,
        }
    }
}

impl HostSignals {
    /// Signals for the main menu.
    #[inline]
    #[must_use]
    pub fn menu() -> Self {
        Self::default()
    }

    /// Signals for a running session with a server context.
    #[inline]
    #[must_use]
    pub fn session() -> Self {
        Self {
            in_session: true,
            has_active_server_context: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

/// Computes the candidate state for `signals`.
///
/// First match wins:
///
/// 1. not in session → `InMenu`
/// 2. replay segment → `InReplaySegment`
/// 3. server context at speed `0.0` → `Paused`
/// 4. server context → `InSession`
/// 5. in session without server context (free play) → `InSession`
#[must_use]
pub fn detect(signals: &HostSignals) -> DiscreteState {
    if !signals.in_session {
        return DiscreteState::InMenu;
    }

    if signals.in_replay_segment {
        return DiscreteState::InReplaySegment;
    }

    if signals.has_active_server_context && signals.session_speed == 0.0 {
        return DiscreteState::Paused;
    }

    DiscreteState::InSession
}

// ============================================================================
// SignalSource
// ============================================================================

/// Supplies host signals on demand.
///
/// Implemented by the host integration. May be called from the polling
/// thread or from host notification threads.
pub trait SignalSource: Send + Sync + 'static {
    /// Samples the current signals.
    fn signals(&self) -> HostSignals;
}

impl<F> SignalSource for F
where
    F: Fn() -> HostSignals + Send + Sync + 'static,
{
    fn signals(&self) -> HostSignals {
        self()
    }
}

/// A [`SignalSource`] the host writes into.
///
/// Useful when the host pushes values from its own thread instead of
/// answering queries.
#[derive(Debug, Default)]
pub struct SignalCell {
    inner: Mutex<HostSignals>,
}

impl SignalCell {
    /// Creates a cell holding `signals`.
    #[must_use]
    pub fn new(signals: HostSignals) -> Self {
        Self {
            inner: Mutex::new(signals),
        }
    }

    /// Replaces the stored signals.
    pub fn set(&self, signals: HostSignals) {
        *self.inner.lock() = signals;
    }

    /// Mutates the stored signals in place.
    pub fn update(&self, f: impl FnOnce(&mut HostSignals)) {
        f(&mut self.inner.lock());
    }
}

impl SignalSource for SignalCell {
    fn signals(&self) -> HostSignals {
        *self.inner.lock()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(in_session: bool, replay: bool, speed: f32, server: bool) -> HostSignals {
        HostSignals {
            in_session,
            in_replay_segment: replay,
            session_speed: speed,
            has_active_server_context: server,
        }
    }

    #[test]
    fn test_default_signals_resolve_to_menu() {
        assert_eq!(detect(&HostSignals::default()), DiscreteState::InMenu);
    }

    #[test]
    fn test_not_in_session_always_menu() {
        for replay in [false, true] {
            for server in [false, true] {
                for speed in [0.0, 1.0, 2.5] {
                    let s = signals(false, replay, speed, server);
                    assert_eq!(detect(&s), DiscreteState::InMenu, "{s:?}");
                }
            }
        }
    }

    #[test]
    fn test_replay_dominates_pause_and_session() {
        assert_eq!(
            detect(&signals(true, true, 0.0, true)),
            DiscreteState::InReplaySegment
        );
        assert_eq!(
            detect(&signals(true, true, 1.0, false)),
            DiscreteState::InReplaySegment
        );
    }

    #[test]
    fn test_paused_needs_server_context() {
        assert_eq!(detect(&signals(true, false, 0.0, true)), DiscreteState::Paused);
        assert_eq!(
            detect(&signals(true, false, 0.0, false)),
            DiscreteState::InSession
        );
    }

    #[test]
    fn test_session_with_and_without_server() {
        assert_eq!(detect(&HostSignals::session()), DiscreteState::InSession);
        assert_eq!(
            detect(&signals(true, false, 1.0, false)),
            DiscreteState::InSession
        );
    }

    #[test]
    fn test_slow_motion_is_not_paused() {
        assert_eq!(
            detect(&signals(true, false, 0.05, true)),
            DiscreteState::InSession
        );
    }

    #[test]
    fn test_fn_is_signal_source() {
        let source = HostSignals::session;
        assert_eq!(source.signals(), HostSignals::session());
    }

    #[test]
    fn test_signal_cell_update() {
        let cell = SignalCell::new(HostSignals::session());
        cell.update(|s| s.session_speed = 0.0);
        assert_eq!(detect(&cell.signals()), DiscreteState::Paused);

        cell.set(HostSignals::menu());
        assert_eq!(detect(&cell.signals()), DiscreteState::InMenu);
    }
}
