//! Wires detection to the transport.
//!
//! [`StateRelay`] owns one [`WsClient`] and one [`Detector`]. Every
//! transition is dispatched to the listener, and each successful connect
//! re-announces the current state so the listener never starts blind.
//!
//! ```text
//! SignalSource ──► Detector ──► StateMachine ──► Dispatcher ──► WsClient ──► listener
//!                     ▲                                            │
//!                HostEvents                          connected ────┘ (announce)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::state::{Detector, DiscreteState, SignalSource};
use crate::transport::{Transport, WsClient};

// ============================================================================
// StateRelay
// ============================================================================

/// Detection plus transport, configured from a [`Config`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use state_relay::{Config, HostEvents, HostSignals, SignalCell, SignalSource, StateRelay};
///
/// # fn example() -> state_relay::Result<()> {
/// let cell = Arc::new(SignalCell::new(HostSignals::menu()));
/// let source = Arc::clone(&cell);
///
/// let relay = StateRelay::new(Config::load_or_default("relay.cfg")?, move || source.signals());
/// relay.start()?;
///
/// cell.set(HostSignals::session());
/// relay.detector().on_session_start();
///
/// relay.stop();
/// # Ok(())
/// # }
/// ```
pub struct StateRelay<S: SignalSource> {
    config: Config,
    client: Arc<WsClient>,
    detector: Arc<Detector<S>>,
}

impl<S: SignalSource> fmt::Debug for StateRelay<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRelay")
            .field("config", &self.config)
            .field("client", &self.client)
            .field("detector", &self.detector)
            .finish()
    }
}

impl<S: SignalSource> StateRelay<S> {
    /// Creates a stopped relay.
    #[must_use]
    pub fn new(config: Config, source: S) -> Self {
        let client = Arc::new(WsClient::with_config(&config));
        let detector = Arc::new(Detector::new(source));
        let dispatcher = Dispatcher::new(Arc::clone(&client));
        detector.set_state_changed_callback(move |transition| {
            dispatcher.dispatch(transition);
        });

        // the client owns this callback, so it must not hold the client strongly
        let weak_client: Weak<WsClient> = Arc::downgrade(&client);
        let weak_detector: Weak<Detector<S>> = Arc::downgrade(&detector);
        client.set_connected_callback(move || {
            if let (Some(client), Some(detector)) = (weak_client.upgrade(), weak_detector.upgrade())
            {
                Dispatcher::new(client).announce(detector.current_state());
            }
        });

        client.set_disconnected_callback(|| warn!("Listener connection lost"));

        Self {
            config,
            client,
            detector,
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the client.
    #[inline]
    #[must_use]
    pub fn client(&self) -> &Arc<WsClient> {
        &self.client
    }

    /// Returns the detector; hand it to the host as [`HostEvents`](crate::HostEvents).
    #[inline]
    #[must_use]
    pub fn detector(&self) -> &Arc<Detector<S>> {
        &self.detector
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn current_state(&self) -> DiscreteState {
        self.detector.current_state()
    }

    /// Returns `true` while the listener connection is usable.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Connects, then starts detection.
    ///
    /// Detection starts even if the connect fails; use
    /// [`reconnect`](Self::reconnect) to retry.
    ///
    /// # Errors
    ///
    /// Returns the connect error, or the detector start error.
    pub fn start(&self) -> Result<()> {
        let connected = self.client.connect();

        self.detector
            .start(self.config.mode, self.config.polling_interval)?;
        self.detector.detect_once();

        info!(
            url = %self.config.url,
            mode = ?self.config.mode,
            connected = connected.is_ok(),
            "Relay started"
        );

        connected
    }

    /// Stops detection and disconnects.
    pub fn stop(&self) {
        self.detector.stop();
        self.client.disconnect();
        info!("Relay stopped");
    }

    /// Drops the current connection and connects again.
    ///
    /// # Errors
    ///
    /// Same as [`WsClient::connect`].
    pub fn reconnect(&self) -> Result<()> {
        self.client.disconnect();
        self.client.connect()
    }
}

impl<S: SignalSource> Drop for StateRelay<S> {
    fn drop(&mut self) {
        self.detector.stop();
        self.client.clear_callbacks();
        self.client.disconnect();
    }
}

// ============================================================================
// Tests
// ============================================================================
