//! State Relay - push application-state transitions to a WebSocket listener.
//!
//! This library detects a coarse discrete state of a host application
//! (menu, session, replay, paused) and pushes every change to a remote
//! listener in near real time over a minimal WebSocket client.
//!
//! # Architecture
//!
//! - **Detection**: a [`Detector`] samples a [`SignalSource`] on a polling
//!   thread, or reacts to [`HostEvents`] pushed by the host
//! - **Gate**: a [`StateMachine`] suppresses duplicate transitions, so the
//!   polling and event paths never double-emit
//! - **Transport**: a [`WsClient`] owns one TCP connection, performs the
//!   opening handshake and sends masked text frames
//!
//! Wire format, one text frame per change:
//!
//! ```json
//! {"state":"InSession","timestamp":1700000000}
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use state_relay::{Config, HostSignals, Result, SignalCell, SignalSource, StateRelay};
//!
//! fn main() -> Result<()> {
//!     let cell = Arc::new(SignalCell::new(HostSignals::menu()));
//!     let source = Arc::clone(&cell);
//!
//!     let relay = StateRelay::new(Config::default(), move || source.signals());
//!     relay.start()?;
//!
//!     // host integration writes signals as they change
//!     cell.set(HostSignals::session());
//!
//!     relay.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`Config`], builder and `key=value` loader |
//! | [`dispatch`] | Transition to message forwarding |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | [`StateMessage`] wire format |
//! | [`relay`] | [`StateRelay`]: detection wired to transport |
//! | [`state`] | States, detection and the transition gate |
//! | [`transport`] | WebSocket client |
//!
//! # Threads
//!
//! At most two background threads exist per relay: `ws-receiver` while
//! connected, and `state-poller` in polling mode. Callbacks run
//! synchronously on whichever thread observed the change and must not block.

// ============================================================================
// Modules
// ============================================================================

/// Relay configuration.
pub mod config;

/// Transition dispatch.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Wire message format.
pub mod protocol;

/// Detection wired to transport.
pub mod relay;

/// State detection.
///
/// - [`DiscreteState`] - Observable states
/// - [`StateMachine`] - Duplicate-suppressing gate
/// - [`Detector`] - Polling or event driven detection
pub mod state;

/// WebSocket transport layer.
///
/// Client-only subset of the protocol over plain TCP.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{Config, ConfigBuilder, DetectionMode};

// Dispatch and relay
pub use dispatch::Dispatcher;
pub use relay::StateRelay;

// Error types
pub use error::{Error, Result};

// Protocol
pub use protocol::StateMessage;

// State types
pub use state::{
    Detector, DiscreteState, HostEvents, HostSignals, SignalCell, SignalSource, StateMachine,
    StateTransition, detect,
};

// Transport types
pub use transport::{Endpoint, Transport, WsClient};
