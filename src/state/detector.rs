//! Detection driver.
//!
//! Drives a [`StateMachine`] from a [`SignalSource`] in one of two modes:
//!
//! | Mode | Driven by | Thread |
//! |------|-----------|--------|
//! | [`DetectionMode::Polling`] | fixed-interval sampling | dedicated `state-poller` thread |
//! | [`DetectionMode::Event`] | host calls into [`HostEvents`] | caller's thread |
//!
//! Direct host events (session start/end, replay start/end, pause toggle)
//! are honoured in both modes; `on_tick` only in event mode. Everything goes
//! through [`StateMachine::update`], so a change seen by both paths is still
//! emitted once.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::DetectionMode;
use crate::error::{Error, Result};

use super::machine::{DiscreteState, StateMachine, StateTransition};
use super::signals::{HostSignals, SignalSource, detect};

// ============================================================================
// HostEvents
// ============================================================================

/// Notifications a host integration delivers to the detector.
///
/// Each method runs synchronously on the calling thread.
pub trait HostEvents: Send + Sync {
    /// Periodic host tick.
    fn on_tick(&self);

    /// A session began.
    fn on_session_start(&self);

    /// A session ended.
    fn on_session_end(&self);

    /// A replay segment began.
    fn on_replay_start(&self);

    /// A replay segment ended.
    fn on_replay_end(&self);

    /// The session was paused or resumed.
    fn on_pause_changed(&self, paused: bool);
}

// ============================================================================
// Detector
// ============================================================================

/// State shared with the polling thread.
struct DetectorInner<S> {
    /// Host signal provider.
    source: S,
    /// The transition gate.
    machine: StateMachine,
    /// Detection running.
    active: AtomicBool,
    /// Current session uses polling mode.
    polling: AtomicBool,
    /// Last signals seen by `on_tick`.
    last_tick_signals: Mutex<Option<HostSignals>>,
}

impl<S: SignalSource> DetectorInner<S> {
    /// Samples, detects and offers the candidate.
    fn refresh(&self) -> Option<StateTransition> {
        let signals = self.source.signals();
        let candidate = detect(&signals);
        trace!(?signals, %candidate, "Detected candidate");
        self.machine.update(candidate)
    }

    /// Sets a state implied by a host event and drops the tick cache.
    fn apply_event(&self, event: &'static str, target: Option<DiscreteState>) {
        if !self.active.load(Ordering::Acquire) {
            trace!(event, "Detection inactive, ignoring host event");
            return;
        }

        debug!(event, "Host event");
        *self.last_tick_signals.lock() = None;

        match target {
            Some(state) => {
                self.machine.update(state);
            }
            None => {
                self.refresh();
            }
        }
    }
}

/// Computes the discrete state and feeds the state machine.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use state_relay::{Detector, DiscreteState, HostSignals, SignalCell, SignalSource};
///
/// let cell = Arc::new(SignalCell::new(HostSignals::session()));
/// let source = Arc::clone(&cell);
/// let detector = Detector::new(move || source.signals());
///
/// detector.detect_once();
/// assert_eq!(detector.current_state(), DiscreteState::InSession);
/// ```
pub struct Detector<S: SignalSource> {
    /// Shared state.
    inner: Arc<DetectorInner<S>>,
    /// Polling thread, when running in polling mode.
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SignalSource> fmt::Debug for Detector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("state", &self.current_state())
            .field("active", &self.is_active())
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl<S: SignalSource> Detector<S> {
    /// Creates an inactive detector over `source`.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            inner: Arc::new(DetectorInner {
                source,
                machine: StateMachine::new(),
                active: AtomicBool::new(false),
                polling: AtomicBool::new(false),
                last_tick_signals: Mutex::new(None),
            }),
            poller: Mutex::new(None),
        }
    }

    /// Returns the state machine, e.g. to register a transition callback.
    #[inline]
    #[must_use]
    pub fn machine(&self) -> &StateMachine {
        &self.inner.machine
    }

    /// Registers the transition callback.
    pub fn set_state_changed_callback<F>(&self, callback: F)
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        self.inner.machine.set_transition_callback(callback);
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn current_state(&self) -> DiscreteState {
        self.inner.machine.current()
    }

    /// Returns `true` while detection is running.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Returns the mode of the current (or last) detection session.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> DetectionMode {
        if self.inner.polling.load(Ordering::Acquire) {
            DetectionMode::Polling
        } else {
            DetectionMode::Event
        }
    }

    /// Runs one detection pass regardless of mode or activity.
    pub fn detect_once(&self) -> Option<StateTransition> {
        self.inner.refresh()
    }

    /// Starts detection.
    ///
    /// No-op if already active. In polling mode a `state-poller` thread
    /// samples every `interval`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `interval` is zero in polling mode
    /// - [`Error::Io`] if the polling thread cannot be spawned
    pub fn start(&self, mode: DetectionMode, interval: Duration) -> Result<()> {
        if mode == DetectionMode::Polling && interval.is_zero() {
            return Err(Error::config("polling interval must be greater than zero"));
        }

        // held until the handle is stored, so a racing stop() always joins it
        let mut poller = self.poller.lock();

        if self.inner.active.swap(true, Ordering::AcqRel) {
            debug!("Detection already active");
            return Ok(());
        }

        self.inner
            .polling
            .store(mode == DetectionMode::Polling, Ordering::Release);
        *self.inner.last_tick_signals.lock() = None;

        if mode == DetectionMode::Polling {
            let inner = Arc::clone(&self.inner);
            let spawned = thread::Builder::new()
                .name("state-poller".into())
                .spawn(move || poll_loop(&inner, interval));

            match spawned {
                Ok(handle) => *poller = Some(handle),
                Err(e) => {
                    self.inner.active.store(false, Ordering::Release);
                    return Err(e.into());
                }
            }
        }

        drop(poller);

        info!(?mode, interval_ms = interval.as_millis() as u64, "Detection started");
        Ok(())
    }

    /// Stops detection and joins the polling thread. Idempotent.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.poller.lock().take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Polling thread panicked");
            }
        }

        info!("Detection stopped");
    }
}

impl<S: SignalSource> Drop for Detector<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the polling thread.
fn poll_loop<S: SignalSource>(inner: &DetectorInner<S>, interval: Duration) {
    debug!("Polling loop started");

    while inner.active.load(Ordering::Acquire) {
        inner.refresh();
        // stop() unparks, so shutdown does not wait out the interval
        thread::park_timeout(interval);
    }

    debug!("Polling loop exited");
}

// ============================================================================
// HostEvents for Detector
// ============================================================================

impl<S: SignalSource> HostEvents for Detector<S> {
    fn on_tick(&self) {
        let inner = &self.inner;
        if !inner.active.load(Ordering::Acquire) || inner.polling.load(Ordering::Acquire) {
            return;
        }

        let signals = inner.source.signals();
        {
            let mut cached = inner.last_tick_signals.lock();
            if *cached == Some(signals) {
                return;
            }
            *cached = Some(signals);
        }

        inner.machine.update(detect(&signals));
    }

    fn on_session_start(&self) {
        self.inner
            .apply_event("session_start", Some(DiscreteState::InSession));
    }

    fn on_session_end(&self) {
        self.inner
            .apply_event("session_end", Some(DiscreteState::InMenu));
    }

    fn on_replay_start(&self) {
        self.inner
            .apply_event("replay_start", Some(DiscreteState::InReplaySegment));
    }

    fn on_replay_end(&self) {
        self.inner.apply_event("replay_end", None);
    }

    fn on_pause_changed(&self, paused: bool) {
        let event = if paused { "paused" } else { "resumed" };
        self.inner.apply_event(event, None);
    }
}

// ============================================================================
// Tests
// ============================================================================
