//! Error types for the state relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use state_relay::{Endpoint, Result};
//!
//! fn example() -> Result<()> {
//!     let endpoint = Endpoint::parse("ws://localhost:8080/state")?;
//!     println!("{}:{}", endpoint.host, endpoint.port);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Endpoint parsing | [`Error::InvalidScheme`], [`Error::InvalidPort`] |
//! | Connection | [`Error::Connection`], [`Error::Handshake`], [`Error::ConnectionTimeout`] |
//! | Session | [`Error::NotConnected`], [`Error::SendFailed`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! No variant is fatal: every failure leaves the client in a disconnected,
//! retryable state.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a config value or config file line is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Endpoint Errors
    // ========================================================================
    /// Endpoint URL does not start with `ws://`.
    #[error("Invalid scheme in endpoint: {url}")]
    InvalidScheme {
        /// The rejected URL.
        url: String,
    },

    /// Endpoint port is not an integer in `1..=65535`.
    #[error("Invalid port '{port}' in endpoint: {url}")]
    InvalidPort {
        /// The rejected URL.
        url: String,
        /// The port text as written.
        port: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// TCP connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Opening handshake rejected by the peer.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Handshake response not received in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No open session to send on.
    #[error("Not connected")]
    NotConnected,

    /// Write on an established connection failed.
    ///
    /// The client is downgraded to disconnected when this is returned.
    #[error("Send failed: {message}")]
    SendFailed {
        /// Description of the write error.
        message: String,
    },

    /// Peer closed the connection or the receive loop hit a fatal read error.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid scheme error.
    #[inline]
    pub fn invalid_scheme(url: impl Into<String>) -> Self {
        Self::InvalidScheme { url: url.into() }
    }

    /// Creates an invalid port error.
    #[inline]
    pub fn invalid_port(url: impl Into<String>, port: impl Into<String>) -> Self {
        Self::InvalidPort {
            url: url.into(),
            port: port.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a send failure error.
    #[inline]
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is an endpoint parse error.
    #[inline]
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::InvalidScheme { .. } | Self::InvalidPort { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Handshake { .. }
                | Self::ConnectionTimeout { .. }
                | Self::NotConnected
                | Self::SendFailed { .. }
                | Self::ConnectionClosed
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Everything except a bad configuration can be retried, possibly
    /// with a corrected endpoint.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_invalid_scheme_display() {
        let err = Error::invalid_scheme("http://localhost");
        assert_eq!(
            err.to_string(),
            "Invalid scheme in endpoint: http://localhost"
        );
    }

    #[test]
    fn test_invalid_port_display() {
        let err = Error::invalid_port("ws://host:abc", "abc");
        assert_eq!(
            err.to_string(),
            "Invalid port 'abc' in endpoint: ws://host:abc"
        );
    }

    #[test]
    fn test_is_parse_error() {
        assert!(Error::invalid_scheme("x").is_parse_error());
        assert!(Error::invalid_port("x", "0").is_parse_error());
        assert!(!Error::connection("x").is_parse_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::handshake("x").is_connection_error());
        assert!(Error::connection_timeout(10).is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::send_failed("broken pipe").is_recoverable());
        assert!(Error::invalid_scheme("x").is_recoverable());
        assert!(!Error::config("x").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
