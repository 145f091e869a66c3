//! Opening handshake.
//!
//! Sends one HTTP upgrade request and reads the response until the end of
//! the header block. The status line must report `101`. When accept-key
//! verification is enabled, `Sec-WebSocket-Accept` must also equal
//! `base64(sha1(key + GUID))`.

// ============================================================================
// Imports
// ============================================================================

use std::io::{ErrorKind, Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::endpoint::Endpoint;

// ============================================================================
// Constants
// ============================================================================

/// GUID appended to the key when computing the accept value.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol version sent in `Sec-WebSocket-Version`.
const WS_VERSION: u8 = 13;

/// Upper bound on the response header block.
const MAX_RESPONSE_LEN: usize = 4096;

/// Status text that marks a successful upgrade.
const SWITCHING_PROTOCOLS: &str = "HTTP/1.1 101";

// ============================================================================
// Key Generation
// ============================================================================

/// Generates a `Sec-WebSocket-Key` from a fresh 16-byte nonce.
#[must_use]
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    Base64Standard.encode(nonce)
}

/// Computes the `Sec-WebSocket-Accept` value a server must echo for `key`.
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    Base64Standard.encode(hasher.finalize())
}

// ============================================================================
// Request / Response
// ============================================================================

/// Builds the upgrade request for `endpoint`.
#[must_use]
pub fn build_request(endpoint: &Endpoint, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: {WS_VERSION}\r\n\
         \r\n",
        path = endpoint.path,
        host = endpoint.host_header(),
    )
}

/// Checks an upgrade response.
///
/// # Errors
///
/// Returns [`Error::Handshake`] if the status is not `101`, or if
/// `verify_accept` is set and the accept header is missing or wrong.
pub fn validate_response(response: &str, key: &str, verify_accept: bool) -> Result<()> {
    if !response.contains(SWITCHING_PROTOCOLS) {
        let status = response.lines().next().unwrap_or_default();
        return Err(Error::handshake(format!("unexpected status: {status:?}")));
    }

    if !verify_accept {
        return Ok(());
    }

    let expected = compute_accept_key(key);
    let echoed = header_value(response, "sec-websocket-accept")
        .ok_or_else(|| Error::handshake("missing Sec-WebSocket-Accept header"))?;

    if echoed != expected {
        return Err(Error::handshake(format!(
            "accept key mismatch: expected {expected}, got {echoed}"
        )));
    }

    Ok(())
}

/// Finds a header by case-insensitive name.
fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response
        .lines()
        .skip(1)
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(header, _)| header.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

// ============================================================================
// Perform
// ============================================================================

/// Runs the opening handshake over `stream`.
///
/// The caller is responsible for setting a read timeout on the underlying
/// socket; a timed-out read surfaces as [`Error::ConnectionTimeout`]
/// carrying `timeout_ms`.
///
/// # Errors
///
/// - [`Error::Connection`] if the request cannot be written or the peer closes
/// - [`Error::ConnectionTimeout`] if the response does not arrive in time
/// - [`Error::Handshake`] if the response is rejected
pub fn perform<S: Read + Write>(
    stream: &mut S,
    endpoint: &Endpoint,
    verify_accept: bool,
    timeout_ms: u64,
) -> Result<()> {
    let key = generate_key();
    let request = build_request(endpoint, &key);

    stream
        .write_all(request.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| Error::connection(format!("failed to send upgrade request: {e}")))?;

    debug!(path = %endpoint.path, "Upgrade request sent");

    let response = read_response(stream, timeout_ms)?;

    validate_response(&response, &key, verify_accept).inspect_err(|e| {
        warn!(error = %e, "Handshake rejected");
    })
}

/// Reads until the blank line ending the header block.
fn read_response<S: Read>(stream: &mut S, timeout_ms: u64) -> Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => return Err(Error::connection("peer closed during handshake")),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(Error::connection_timeout(timeout_ms));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::connection(format!("handshake read failed: {e}"))),
        };

        buf.extend_from_slice(&chunk[..n]);

        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_RESPONSE_LEN {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    /// In-memory duplex: reads from a canned response, records writes.
    struct FakeStream {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl FakeStream {
        fn new(response: &str) -> Self {
            Self {
                input: Cursor::new(response.as_bytes().to_vec()),
                written: Vec::new(),
            }
        }

        fn sent_key(&self) -> String {
            let text = String::from_utf8_lossy(&self.written);
            header_value(&text, "Sec-WebSocket-Key")
                .unwrap()
                .to_string()
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("ws://localhost:8080/state").unwrap()
    }

    #[test]
    fn test_generate_key_is_16_bytes_base64() {
        let key = generate_key();
        assert_eq!(key.len(), 24);
        let decoded = Base64Standard.decode(&key).unwrap();
        assert_eq!(decoded.len(), 16);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_compute_accept_key_rfc_example() {
        // RFC 6455 section 1.3
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_build_request_format() {
        let request = build_request(&endpoint(), "abc==");
        assert!(request.starts_with("GET /state HTTP/1.1\r\n"));
        assert!(request.contains("Host: localhost:8080\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: abc==\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_validate_requires_101() {
        let err = validate_response("HTTP/1.1 400 Bad Request\r\n\r\n", "k", false).unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[test]
    fn test_validate_lenient_accepts_any_101() {
        assert!(validate_response("HTTP/1.1 101 Switching Protocols\r\n\r\n", "k", false).is_ok());
    }

    #[test]
    fn test_validate_checks_accept_key() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let good = "HTTP/1.1 101 Switching Protocols\r\n\
                    upgrade: websocket\r\n\
                    sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        assert!(validate_response(good, key, true).is_ok());

        let wrong = "HTTP/1.1 101 Switching Protocols\r\n\
                     Sec-WebSocket-Accept: AAAAAAAAAAAAAAAAAAAAAAAAAAA=\r\n\r\n";
        assert!(validate_response(wrong, key, true).is_err());

        let missing = "HTTP/1.1 101 Switching Protocols\r\n\r\n";
        assert!(validate_response(missing, key, true).is_err());
    }

    #[test]
    fn test_perform_without_verification() {
        let mut stream = FakeStream::new("HTTP/1.1 101 Switching Protocols\r\n\r\n");
        perform(&mut stream, &endpoint(), false, 1000).unwrap();

        let sent = String::from_utf8(stream.written.clone()).unwrap();
        assert!(sent.starts_with("GET /state HTTP/1.1\r\n"));
    }

    #[test]
    fn test_perform_rejects_wrong_accept() {
        let mut stream = FakeStream::new(
            "HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: nope\r\n\r\n",
        );
        let err = perform(&mut stream, &endpoint(), true, 1000).unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
        assert_eq!(stream.sent_key().len(), 24);
    }

    #[test]
    fn test_perform_peer_closes() {
        let mut stream = FakeStream::new("");
        let err = perform(&mut stream, &endpoint(), false, 1000).unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }
}
