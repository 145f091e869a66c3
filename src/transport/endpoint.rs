//! Endpoint URL resolution.
//!
//! Parses `ws://host[:port][/path]` into connection parameters.
//!
//! Parsing is deliberately lenient: no percent-decoding, no IPv6 brackets,
//! no query handling. Odd hosts pass through and simply fail at connect time.
//! Only the scheme prefix and the port number are enforced here.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Required scheme prefix.
pub const SCHEME: &str = "ws://";

/// Port used when the authority has none.
pub const DEFAULT_PORT: u16 = 80;

/// Path used when the URL has none.
pub const DEFAULT_PATH: &str = "/";

// ============================================================================
// Endpoint
// ============================================================================

/// Connection parameters for one WebSocket endpoint.
///
/// Immutable once parsed. [`WsClient`](super::WsClient) re-derives it from
/// the raw URL on every connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address, as written.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Request path, always starting with `/`.
    pub path: String,
}

impl Endpoint {
    /// Parses an endpoint URL.
    ///
    /// The text after `ws://` is split on the first `/`: the part before is
    /// the authority, the rest (slash included) is the path. The authority
    /// is split on the first `:` into host and port.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidScheme`] if the URL does not start with `ws://`
    /// - [`Error::InvalidPort`] if a port is present but not in `1..=65535`
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::invalid_scheme(url))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, DEFAULT_PATH),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port_text)) => {
                let port = port_text
                    .parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| Error::invalid_port(url, port_text))?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Returns the `Host` header value (`host:port`).
    #[inline]
    #[must_use]
    pub fn host_header(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}:{}{}", self.host, self.port, self.path)
    }
}

// ============================================================================
// Tests
// ============================================================================
