//! Forwards state transitions to a transport.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, warn};

use crate::state::{DiscreteState, StateTransition, unix_now};
use crate::transport::Transport;

// ============================================================================
// Dispatcher
// ============================================================================

/// Sends each transition as a [`StateMessage`](crate::StateMessage).
///
/// Send failures are logged and dropped; the transport has already
/// downgraded itself and reported through its error callback.
#[derive(Debug)]
pub struct Dispatcher<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Creates a dispatcher over `transport`.
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Returns the transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Sends `transition.next`. Returns `true` if a message was written.
    pub fn dispatch(&self, transition: &StateTransition) -> bool {
        self.send(transition.next, transition.observed_at_unix_seconds)
    }

    /// Re-sends the current state, e.g. right after a connect.
    pub fn announce(&self, state: DiscreteState) -> bool {
        self.send(state, unix_now())
    }

    fn send(&self, state: DiscreteState, timestamp: i64) -> bool {
        if state.is_unknown() {
            return false;
        }

        if !self.transport.is_connected() {
            debug!(%state, "Not connected, skipping state message");
            return false;
        }

        match self.transport.send_json_message(state.as_str(), timestamp) {
            Ok(()) => {
                debug!(%state, timestamp, "State message sent");
                true
            }
            Err(e) => {
                warn!(%state, error = %e, "Failed to send state message");
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
