//! Wire message pushed to the listener.
//!
//! Each state change is one text frame:
//!
//! ```json
//! {"state":"InMenu","timestamp":1700000000}
//! ```
//!
//! The timestamp is Unix seconds.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::{DiscreteState, StateTransition};

// ============================================================================
// StateMessage
// ============================================================================

/// A state notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMessage<'a> {
    /// State name, e.g. `"InSession"`.
    pub state: &'a str,
    /// Unix seconds.
    pub timestamp: i64,
}

impl<'a> StateMessage<'a> {
    /// Creates a message.
    #[inline]
    #[must_use]
    pub const fn new(state: &'a str, timestamp: i64) -> Self {
        Self { state, timestamp }
    }

    /// Serializes to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl StateMessage<'static> {
    /// Creates a message for `state` at `timestamp`.
    #[inline]
    #[must_use]
    pub const fn for_state(state: DiscreteState, timestamp: i64) -> Self {
        Self::new(state.as_str(), timestamp)
    }
}

impl From<&StateTransition> for StateMessage<'static> {
    fn from(transition: &StateTransition) -> Self {
        Self::for_state(transition.next, transition.observed_at_unix_seconds)
    }
}

// ============================================================================
// Tests
// ============================================================================
