//! Relay configuration.
//!
//! Provides [`Config`], its fluent [`ConfigBuilder`], and a loader for the
//! plain `key=value` file format hosts already ship:
//!
//! ```text
//! # state relay
//! websocket_url=ws://localhost:8080
//! polling_interval_ms=200
//! use_polling=false
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use state_relay::{Config, DetectionMode};
//!
//! # fn example() -> state_relay::Result<()> {
//! let config = Config::builder()
//!     .url("ws://127.0.0.1:9000/state")
//!     .mode(DetectionMode::Polling)
//!     .polling_interval(Duration::from_millis(100))
//!     .build()?;
//!
//! assert_eq!(config.mode, DetectionMode::Polling);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::Endpoint;

// ============================================================================
// Constants
// ============================================================================

/// Default listener URL.
pub const DEFAULT_URL: &str = "ws://localhost:8080";

/// Default polling interval.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(200);

/// Default bound on the handshake response read.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default receive-loop read timeout; also the worst-case disconnect latency.
pub const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// DetectionMode
// ============================================================================

/// How state recomputation is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectionMode {
    /// A dedicated thread samples the host at a fixed interval.
    Polling,
    /// The host pushes ticks and events; no thread is spawned.
    #[default]
    Event,
}

// ============================================================================
// Config
// ============================================================================

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listener endpoint, `ws://host[:port][/path]`.
    pub url: String,
    /// Detection mode, fixed for the lifetime of a detection session.
    pub mode: DetectionMode,
    /// Sampling interval in polling mode.
    pub polling_interval: Duration,
    /// Bound on the handshake response read.
    pub handshake_timeout: Duration,
    /// Read timeout of the receive loop.
    pub read_poll_interval: Duration,
    /// Require a correct `Sec-WebSocket-Accept` in the handshake response.
    pub verify_accept_key: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            mode: DetectionMode::default(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            read_poll_interval: DEFAULT_READ_POLL_INTERVAL,
            verify_accept_key: true,
        }
    }
}

impl Config {
    /// Creates a configuration builder seeded with defaults.
    #[inline]
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Loads a `key=value` config file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Config`] if a value is malformed or the result is invalid
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse_str(&text)
    }

    /// Loads a config file, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_file`], except a missing file is not an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::from_file(path.as_ref()) {
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.as_ref().display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parses `key=value` text on top of the defaults.
    ///
    /// Blank lines and lines starting with `#` are skipped. Lines without
    /// `=` and unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a known key has a malformed value or
    /// the resulting configuration fails validation.
    pub fn parse_str(text: &str) -> Result<Self> {
        let mut builder = ConfigBuilder::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            builder = match key {
                "websocket_url" => builder.url(value),
                "polling_interval_ms" => {
                    builder.polling_interval(Duration::from_millis(parse_ms(line_no, key, value)?))
                }
                "handshake_timeout_ms" => {
                    builder.handshake_timeout(Duration::from_millis(parse_ms(line_no, key, value)?))
                }
                "use_polling" => builder.mode(if value == "true" {
                    DetectionMode::Polling
                } else {
                    DetectionMode::Event
                }),
                "verify_accept_key" => builder.verify_accept_key(value == "true"),
                unknown => {
                    debug!(key = unknown, line = line_no + 1, "Ignoring unknown config key");
                    builder
                }
            };
        }

        builder.build()
    }
}

/// Parses a millisecond value for `key`.
fn parse_ms(line_no: usize, key: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        Error::config(format!(
            "line {}: {key} must be a non-negative integer, got {value:?}",
            line_no + 1
        ))
    })
}

// ============================================================================
// ConfigBuilder
// ============================================================================

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a builder seeded with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listener URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Sets the detection mode.
    #[inline]
    #[must_use]
    pub fn mode(mut self, mode: DetectionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Sets the polling interval.
    #[inline]
    #[must_use]
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.config.polling_interval = interval;
        self
    }

    /// Sets the handshake read timeout.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Sets the receive-loop read timeout.
    #[inline]
    #[must_use]
    pub fn read_poll_interval(mut self, interval: Duration) -> Self {
        self.config.read_poll_interval = interval;
        self
    }

    /// Enables or disables accept-key verification.
    #[inline]
    #[must_use]
    pub fn verify_accept_key(mut self, verify: bool) -> Self {
        self.config.verify_accept_key = verify;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidScheme`] / [`Error::InvalidPort`] if the URL does not parse
    /// - [`Error::Config`] if any duration is zero
    pub fn build(self) -> Result<Config> {
        Endpoint::parse(&self.config.url)?;

        for (name, value) in [
            ("polling interval", self.config.polling_interval),
            ("handshake timeout", self.config.handshake_timeout),
            ("read poll interval", self.config.read_poll_interval),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        Ok(self.config)
    }
}

// ============================================================================
// Tests
// ============================================================================
