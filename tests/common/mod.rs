//! Shared utilities for integration tests.
//!
//! The client under test is blocking, so the mock listener runs on its own
//! tokio runtime and exposes a synchronous API.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Default wait used by the helpers.
pub const WAIT: Duration = Duration::from_secs(5);

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ============================================================================
// MockWsServer
// ============================================================================

/// WebSocket listener recording every text message it receives.
pub struct MockWsServer {
    pub addr: SocketAddr,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    close_tx: broadcast::Sender<()>,
    runtime: Option<Runtime>,
}

impl MockWsServer {
    /// Binds to an ephemeral port and starts accepting.
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let messages = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (close_tx, _) = broadcast::channel(4);

        {
            let messages = Arc::clone(&messages);
            let connections = Arc::clone(&connections);
            let close_tx = close_tx.clone();

            runtime.spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let close_rx = close_tx.subscribe();
                    tokio::spawn(Self::handle_connection(
                        stream,
                        Arc::clone(&messages),
                        close_rx,
                    ));
                }
            });
        }

        Self {
            addr,
            messages,
            connections,
            close_tx,
            runtime: Some(runtime),
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        messages: Arc<Mutex<Vec<String>>>,
        mut close_rx: broadcast::Receiver<()>,
    ) {
        let Ok(ws_stream) = accept_async(stream).await else {
            return;
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            // drain frames already sent before honouring a close request
            tokio::select! {
                biased;
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => messages.lock().push(text.as_str().to_owned()),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                _ = close_rx.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    /// Returns the `ws://` URL of this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns all text messages received so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Waits until at least `count` messages arrived and returns them.
    pub fn wait_for_messages(&self, count: usize) -> Vec<String> {
        wait_until(WAIT, || self.messages.lock().len() >= count);
        self.messages()
    }

    /// Returns the number of accepted TCP connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Closes every open connection from the server side.
    pub fn close_clients(&self) {
        let _ = self.close_tx.send(());
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.close_clients();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// ============================================================================
// Raw responder
// ============================================================================

/// Accepts one connection and answers the upgrade request with `response`.
///
/// The socket is held open until the client closes it.
pub fn spawn_raw_responder(response: &'static str) -> SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };

        let mut request = Vec::new();
        let mut chunk = [0u8; 512];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&chunk[..n]),
            }
        }

        if stream.write_all(response.as_bytes()).is_err() {
            return;
        }

        while matches!(stream.read(&mut chunk), Ok(n) if n > 0) {}
    });

    addr
}
