//! WebSocket client and receive loop.
//!
//! [`WsClient`] owns at most one TCP session at a time. `connect()` runs the
//! opening handshake synchronously, then spawns a `ws-receiver` thread that
//! drains inbound bytes until the peer closes, a fatal read error occurs, or
//! `disconnect()` is called.
//!
//! # Threads
//!
//! Callbacks run synchronously on the thread that observed the condition:
//!
//! | Callback | Fired from |
//! |----------|------------|
//! | connected | caller of `connect()` |
//! | disconnected | `ws-receiver` on peer close, caller of `disconnect()` otherwise |
//! | error | caller of `connect()` / `send_text()` |
//!
//! Callbacks may send through the client but must not call `connect()` or
//! `disconnect()` from the disconnected callback.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};

use super::Transport;
use super::endpoint::Endpoint;
use super::frame::{FrameHeader, encode_text_frame, new_mask_key};
use super::handshake;

// ============================================================================
// Constants
// ============================================================================

/// Receive buffer size.
const RECV_BUFFER_SIZE: usize = 1024;

/// Name of the receive thread.
const RECEIVER_THREAD_NAME: &str = "ws-receiver";

// ============================================================================
// Types
// ============================================================================

/// Callback for connect and disconnect notifications.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving an error description.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Registered callbacks.
#[derive(Default)]
struct Callbacks {
    connected: Option<LifecycleCallback>,
    disconnected: Option<LifecycleCallback>,
    error: Option<ErrorCallback>,
}

/// State shared with the receive thread.
#[derive(Default)]
struct Shared {
    /// Receive loop is active.
    running: AtomicBool,
    /// Socket believed usable for sends.
    connected: AtomicBool,
    /// Set on connect, cleared by the first disconnect notification.
    session_open: AtomicBool,
    callbacks: RwLock<Callbacks>,
}

impl Shared {
    fn notify_connected(&self) {
        let callback = self.callbacks.read().connected.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Fires the disconnected callback once per session.
    fn notify_disconnected(&self) {
        if !self.session_open.swap(false, Ordering::AcqRel) {
            return;
        }

        info!("Disconnected");

        let callback = self.callbacks.read().disconnected.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn notify_error(&self, message: &str) {
        let callback = self.callbacks.read().error.clone();
        if let Some(callback) = callback {
            callback(message);
        }
    }
}

// ============================================================================
// WsClient
// ============================================================================

/// Minimal WebSocket client sending masked text frames.
///
/// # Example
///
/// ```no_run
/// use state_relay::{Transport, WsClient};
///
/// # fn example() -> state_relay::Result<()> {
/// let client = WsClient::new("ws://localhost:8080");
/// client.set_error_callback(|message| eprintln!("relay error: {message}"));
///
/// client.connect()?;
/// client.send_json_message("InMenu", 1_700_000_000)?;
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
pub struct WsClient {
    /// Raw endpoint URL, re-parsed on each connect.
    url: String,
    handshake_timeout: Duration,
    read_poll_interval: Duration,
    verify_accept_key: bool,
    shared: Arc<Shared>,
    /// Write half of the current session.
    writer: Mutex<Option<TcpStream>>,
    /// Receive thread of the current (or last) session.
    receiver: Mutex<Option<JoinHandle<()>>>,
    /// Serializes `connect()` and `disconnect()`.
    lifecycle: Mutex<()>,
}

impl fmt::Debug for WsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsClient")
            .field("url", &self.url)
            .field("running", &self.is_running())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl WsClient {
    /// Creates a disconnected client for `url` with default timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let config = Config::default();
        Self {
            url: url.into(),
            handshake_timeout: config.handshake_timeout,
            read_poll_interval: config.read_poll_interval,
            verify_accept_key: config.verify_accept_key,
            shared: Arc::new(Shared::default()),
            writer: Mutex::new(None),
            receiver: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Creates a disconnected client from `config`.
    #[must_use]
    pub fn with_config(config: &Config) -> Self {
        let mut client = Self::new(config.url.clone());
        client.handshake_timeout = config.handshake_timeout;
        client.read_poll_interval = config.read_poll_interval;
        client.verify_accept_key = config.verify_accept_key;
        client
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` while the receive loop is active.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Sets the callback fired after a successful connect.
    pub fn set_connected_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.callbacks.write().connected = Some(Arc::new(callback));
    }

    /// Sets the callback fired once when a session ends.
    pub fn set_disconnected_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.callbacks.write().disconnected = Some(Arc::new(callback));
    }

    /// Sets the callback fired on connect and send failures.
    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().error = Some(Arc::new(callback));
    }

    /// Removes all callbacks.
    pub fn clear_callbacks(&self) {
        *self.shared.callbacks.write() = Callbacks::default();
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connects and starts the receive loop.
    ///
    /// If a session is already running, returns its current connected state
    /// without touching the socket.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidScheme`] / [`Error::InvalidPort`] if the URL does not parse
    /// - [`Error::Connection`] if the TCP connection fails
    /// - [`Error::ConnectionTimeout`] if the handshake response does not arrive
    /// - [`Error::Handshake`] if the server rejects the upgrade
    /// - [`Error::NotConnected`] if a running session has lost its socket
    pub fn connect(&self) -> Result<()> {
        let guard = self.lifecycle.lock();

        if self.is_running() {
            debug!("Connect skipped, session already running");
            if self.is_connected() {
                return Ok(());
            }

            drop(guard);
            let err = Error::NotConnected;
            warn!(url = %self.url, "Session running without a usable socket");
            self.shared.notify_error(&err.to_string());
            return Err(err);
        }

        // previous session ended on its own; its thread has exited or is about to
        self.join_receiver();

        let (writer, reader) = match self.open_session() {
            Ok(halves) => halves,
            Err(e) => {
                drop(guard);
                warn!(url = %self.url, error = %e, "Connect failed");
                self.shared.notify_error(&e.to_string());
                return Err(e);
            }
        };

        self.shared.running.store(true, Ordering::Release);
        self.shared.connected.store(true, Ordering::Release);
        self.shared.session_open.store(true, Ordering::Release);
        *self.writer.lock() = Some(writer);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(RECEIVER_THREAD_NAME.into())
            .spawn(move || receive_loop(reader, &shared));

        match spawned {
            Ok(handle) => *self.receiver.lock() = Some(handle),
            Err(e) => {
                self.reset_session();
                self.shared.session_open.store(false, Ordering::Release);
                drop(guard);
                let err = Error::from(e);
                warn!(error = %err, "Failed to spawn receive thread");
                self.shared.notify_error(&err.to_string());
                return Err(err);
            }
        }

        drop(guard);

        info!(url = %self.url, "Connected");
        self.shared.notify_connected();
        Ok(())
    }

    /// Stops the receive loop and closes the socket. Idempotent.
    ///
    /// On return the receive thread has been joined.
    pub fn disconnect(&self) {
        {
            let _guard = self.lifecycle.lock();
            self.shared.running.store(false, Ordering::Release);
            self.reset_session();
            self.join_receiver();
        }

        self.shared.notify_disconnected();
    }

    /// Clears flags and shuts the socket down so a blocked read returns.
    fn reset_session(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.connected.store(false, Ordering::Release);

        if let Some(stream) = self.writer.lock().take()
            && let Err(e) = stream.shutdown(Shutdown::Both)
            && e.kind() != ErrorKind::NotConnected
        {
            debug!(error = %e, "Socket shutdown failed");
        }
    }

    fn join_receiver(&self) {
        let Some(handle) = self.receiver.lock().take() else {
            return;
        };

        if handle.thread().id() == thread::current().id() {
            debug!("Disconnect called from receive thread, detaching");
            return;
        }

        if handle.join().is_err() {
            warn!("Receive thread panicked");
        }
    }

    /// Opens the TCP connection and performs the handshake.
    ///
    /// Returns the write half and a cloned read half.
    fn open_session(&self) -> Result<(TcpStream, TcpStream)> {
        let endpoint = Endpoint::parse(&self.url)?;
        debug!(%endpoint, "Connecting");

        let mut stream = self.open_tcp(&endpoint)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.handshake_timeout))?;

        handshake::perform(
            &mut stream,
            &endpoint,
            self.verify_accept_key,
            duration_ms(self.handshake_timeout),
        )?;

        stream.set_read_timeout(Some(self.read_poll_interval))?;
        let reader = stream.try_clone()?;

        Ok((stream, reader))
    }

    /// Connects to the first reachable resolved address.
    fn open_tcp(&self, endpoint: &Endpoint) -> Result<TcpStream> {
        let addrs = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| Error::connection(format!("failed to resolve {endpoint}: {e}")))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.handshake_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    trace!(%addr, error = %e, "Address unreachable");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => Error::connection(format!("failed to connect to {endpoint}: {e}")),
            None => Error::connection(format!("no addresses for {endpoint}")),
        })
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Transport for WsClient
// ============================================================================

impl Transport for WsClient {
    #[inline]
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn send_text(&self, text: &str) -> Result<()> {
        let frame = encode_text_frame(text.as_bytes(), new_mask_key());

        let written = {
            let mut writer = self.writer.lock();
            let Some(stream) = writer.as_mut() else {
                return Err(Error::NotConnected);
            };
            // socket kept until disconnect(), but the session is gone
            if !self.is_connected() {
                return Err(Error::ConnectionClosed);
            }
            stream.write_all(&frame).and_then(|()| stream.flush())
        };

        if let Err(e) = written {
            self.shared.connected.store(false, Ordering::Release);
            let err = Error::send_failed(e.to_string());
            warn!(error = %err, "Send failed");
            self.shared.notify_error(&err.to_string());
            return Err(err);
        }

        trace!(len = text.len(), "Sent text frame");
        Ok(())
    }
}

// ============================================================================
// Receive Loop
// ============================================================================

/// Body of the receive thread.
fn receive_loop(mut stream: TcpStream, shared: &Shared) {
    debug!("Receive loop started");
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    while shared.running.load(Ordering::Acquire) {
        match stream.read(&mut buf) {
            Ok(0) => {
                debug!("Stream ended");
                break;
            }
            Ok(n) => log_inbound(&buf[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                if shared.running.load(Ordering::Acquire) {
                    warn!(error = %e, "Receive failed");
                }
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::Release);

    // disconnect() clears running first and notifies on its own thread
    if shared.running.swap(false, Ordering::AcqRel) {
        info!("Connection closed by peer");
        shared.notify_disconnected();
    }

    debug!("Receive loop exited");
}

/// Traces a best-effort decode of inbound bytes.
fn log_inbound(bytes: &[u8]) {
    match FrameHeader::parse(bytes) {
        Some(header) => {
            let payload = header.payload(bytes);
            trace!(
                opcode = ?header.opcode,
                fin = header.fin,
                payload_len = header.payload_len,
                payload = %String::from_utf8_lossy(&payload),
                "Received frame"
            );
        }
        None => trace!(len = bytes.len(), "Received bytes"),
    }
}

#[inline]
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;

    /// Answers one upgrade with a bare `101` and keeps the socket open.
    fn spawn_plain_101_listener() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 512];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                request.extend_from_slice(&chunk[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 101 Switching Protocols\r\n\r\n")
                .unwrap();

            // a half-closed client must not see the peer go away
            while matches!(stream.read(&mut chunk), Ok(n) if n > 0) {}
            thread::sleep(Duration::from_secs(5));
        });

        port
    }

    /// Connected client whose write half is shut down, plus its error count.
    fn client_with_dead_writer() -> (WsClient, Arc<AtomicUsize>) {
        let config = Config::builder()
            .url(format!("ws://127.0.0.1:{}", spawn_plain_101_listener()))
            .verify_accept_key(false)
            .read_poll_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let client = WsClient::with_config(&config);

        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        client.set_error_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().unwrap();
        client
            .writer
            .lock()
            .as_ref()
            .unwrap()
            .shutdown(Shutdown::Write)
            .unwrap();

        (client, errors)
    }

    #[test]
    fn test_write_error_downgrades_and_reports() {
        let (client, errors) = client_with_dead_writer();

        let err = client.send_text("InMenu").unwrap_err();
        assert!(matches!(err, Error::SendFailed { .. }));
        assert!(!client.is_connected());
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // downgraded: later sends fail without touching the socket
        assert!(matches!(client.send_text("again"), Err(Error::ConnectionClosed)));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_on_downgraded_session_reports_error() {
        let (client, errors) = client_with_dead_writer();
        assert!(client.send_text("InMenu").is_err());
        assert!(client.is_running());

        let err = client.connect().unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(errors.load(Ordering::SeqCst), 2);

        client.disconnect();
        assert!(!client.is_running());
    }

    #[test]
    fn test_new_is_disconnected() {
        let client = WsClient::new("ws://localhost:8080");
        assert!(!client.is_connected());
        assert!(!client.is_running());
        assert_eq!(client.url(), "ws://localhost:8080");
    }

    #[test]
    fn test_with_config_copies_timeouts() {
        let config = Config::builder()
            .url("ws://127.0.0.1:9/x")
            .handshake_timeout(Duration::from_millis(300))
            .read_poll_interval(Duration::from_millis(15))
            .verify_accept_key(false)
            .build()
            .unwrap();

        let client = WsClient::with_config(&config);
        assert_eq!(client.url(), "ws://127.0.0.1:9/x");
        assert_eq!(client.handshake_timeout, Duration::from_millis(300));
        assert_eq!(client.read_poll_interval, Duration::from_millis(15));
        assert!(!client.verify_accept_key);
    }

    #[test]
    fn test_send_when_disconnected() {
        let client = WsClient::new("ws://localhost:8080");
        assert!(matches!(client.send_text("hi"), Err(Error::NotConnected)));
        assert!(client.send_json_message("InMenu", 1000).is_ok());
    }

    #[test]
    fn test_connect_bad_url_fires_error_callback() {
        let client = WsClient::new("http://localhost:8080");
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        client.set_error_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = client.connect().unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!client.is_running());
    }

    #[test]
    fn test_connect_refused() {
        // bind then drop to get a port nothing listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let client = WsClient::new(format!("ws://127.0.0.1:{port}"));
        let err = client.connect().unwrap_err();
        assert!(err.is_connection_error());
        assert!(!client.is_connected());
        assert!(!client.is_running());
    }

    #[test]
    fn test_handshake_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = Config::builder()
            .url(format!("ws://127.0.0.1:{port}"))
            .handshake_timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = WsClient::with_config(&config);

        // accepted by the backlog but never answered
        let err = client.connect().unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 100 }));
        assert!(!client.is_running());
        drop(listener);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let client = WsClient::new("ws://localhost:8080");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        client.set_disconnected_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.disconnect();
        client.disconnect();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_callbacks() {
        let client = WsClient::new("ws://");
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        client.set_error_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        client.clear_callbacks();

        assert!(client.connect().is_err());
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }
}
