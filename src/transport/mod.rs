//! WebSocket transport layer.
//!
//! A client-only subset of the WebSocket protocol over plain TCP: endpoint
//! parsing, the opening handshake, masked outbound text frames, and a
//! receive loop that drains inbound bytes for diagnostics.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Idle ──connect()──► Connecting ──► Handshaking ──► Open ──► Closed
//!                          │               │                     ▲
//!                          └───────────────┴──── failure ────────┘
//! ```
//!
//! 1. [`Endpoint::parse`] - Re-derived from the URL on every attempt
//! 2. [`handshake::perform`] - Upgrade request, `101` response
//! 3. `ws-receiver` thread - Runs until peer close or `disconnect()`
//! 4. [`Transport::send_text`] - Masked text frames, serialized by a lock
//!
//! Reconnection is never automatic.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `endpoint` | `ws://host[:port][/path]` parsing |
//! | `handshake` | Upgrade request and response validation |
//! | `frame` | Frame encoding and masking |
//! | `client` | [`WsClient`] and its receive loop |

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::error::Result;
use crate::protocol::StateMessage;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client and receive loop.
pub mod client;

/// Endpoint URL parsing.
pub mod endpoint;

/// Frame encoding and masking.
pub mod frame;

/// Opening handshake.
pub mod handshake;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{ErrorCallback, LifecycleCallback, WsClient};
pub use endpoint::Endpoint;
pub use frame::{FrameHeader, OpCode};

// ============================================================================
// Transport
// ============================================================================

/// Outbound side of a connection.
///
/// Implemented by [`WsClient`]; tests substitute recording stubs.
pub trait Transport: Send + Sync {
    /// Returns `true` while the socket is believed usable for sends.
    fn is_connected(&self) -> bool;

    /// Sends `text` as a single text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`](crate::Error::NotConnected) without a session
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) after the session was lost
    /// - [`Error::SendFailed`](crate::Error::SendFailed) if the write fails
    fn send_text(&self, text: &str) -> Result<()>;

    /// Sends `{"state":"<state>","timestamp":<timestamp>}`.
    ///
    /// Does nothing when not connected.
    ///
    /// # Errors
    ///
    /// Propagates [`Transport::send_text`] failures.
    fn send_json_message(&self, state: &str, timestamp: i64) -> Result<()> {
        if !self.is_connected() {
            debug!(state, "Not connected, dropping state message");
            return Ok(());
        }

        let json = StateMessage::new(state, timestamp).to_json()?;
        self.send_text(&json)
    }
}
