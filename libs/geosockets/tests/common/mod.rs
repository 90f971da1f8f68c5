//! Common test utilities for geosockets integration tests
//!
//! A scriptable WebSocket server on 127.0.0.1 plus a handler that records
//! everything the connection manager reports.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use geosockets::{LifecycleEvent, Result, SessionHandler};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the server does with one incoming connection
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Complete the handshake and echo text/binary frames
    Echo,
    /// Complete the handshake, then close with this code
    CloseWith(u16),
    /// Refuse the upgrade with this HTTP status
    Reject(u16),
    /// Accept TCP but never answer the handshake
    Hang,
}

/// A scriptable mock WebSocket server
///
/// Connections consume the script in order; once it runs out every
/// connection gets `Echo`.
pub struct MockWsServer {
    pub addr: SocketAddr,
    script: Arc<Mutex<VecDeque<Behavior>>>,
    connections: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<Option<String>>>>,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start(script: Vec<Behavior>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let connections = Arc::new(AtomicUsize::new(0));
        let queries = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(Notify::new());

        let server = Self {
            addr,
            script: Arc::clone(&script),
            connections: Arc::clone(&connections),
            queries: Arc::clone(&queries),
            shutdown: Arc::clone(&shutdown),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, _)) => {
                            connections.fetch_add(1, Ordering::SeqCst);
                            let behavior = script.lock().pop_front().unwrap_or(Behavior::Echo);
                            let queries = Arc::clone(&queries);
                            let shutdown = Arc::clone(&shutdown);
                            tokio::spawn(async move {
                                handle_connection(stream, behavior, queries, shutdown).await;
                            });
                        }
                        Err(e) => {
                            eprintln!("Accept error: {}", e);
                            break;
                        }
                    },
                    _ = shutdown.notified() => break,
                }
            }
        });

        server
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}/stream", self.addr)
    }

    /// TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Query strings seen by completed or refused handshakes
    pub fn queries(&self) -> Vec<Option<String>> {
        self.queries.lock().clone()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: Behavior,
    queries: Arc<Mutex<Vec<Option<String>>>>,
    shutdown: Arc<Notify>,
) {
    if let Behavior::Hang = behavior {
        // Keep the socket open without ever answering
        shutdown.notified().await;
        drop(stream);
        return;
    }

    let reject = match behavior {
        Behavior::Reject(status) => Some(status),
        _ => None,
    };
    let callback = move |request: &Request, response: Response| {
        queries
            .lock()
            .push(request.uri().query().map(str::to_string));
        match reject {
            Some(status) => {
                let refusal: ErrorResponse = http::Response::builder()
                    .status(status)
                    .body(Some("refused".to_string()))
                    .unwrap();
                Err(refusal)
            }
            None => Ok(response),
        }
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws_stream.split();

    if let Behavior::CloseWith(code) = behavior {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "scripted close".into(),
        };
        let _ = write.send(Message::Close(Some(frame))).await;
        // Drain until the client's reply completes the handshake
        while let Some(Ok(_)) = read.next().await {}
        return;
    }

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                    if write.send(msg).await.is_err() {
                        break;
                    }
                }
                // Close replies are flushed by further reads
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => break,
            },
            _ = shutdown.notified() => break,
        }
    }
}

/// Records payloads and lifecycle events reported by a manager
pub struct RecordingHandler {
    messages: Mutex<Vec<Value>>,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    reconnected: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            events_tx,
            reconnected: AtomicUsize::new(0),
        });
        (handler, events_rx)
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().clone()
    }

    pub fn reconnected(&self) -> usize {
        self.reconnected.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionHandler for RecordingHandler {
    fn handle_message(&self, message: Value) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }

    fn handle_lifecycle(&self, event: LifecycleEvent) {
        verbose_println!("lifecycle: {:?}", event);
        let _ = self.events_tx.send(event);
    }

    async fn handle_reconnected(&self) {
        self.reconnected.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wait for the next lifecycle event (panics after 5s)
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<LifecycleEvent>) -> LifecycleEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for lifecycle event")
        .expect("event channel closed")
}

/// Assert that no lifecycle event arrives within `window`
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<LifecycleEvent>, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, events.recv()).await {
        panic!("unexpected lifecycle event {event:?}");
    }
}

/// Poll until `check` passes (panics after 5s)
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
