//! Common test utilities for waypoint session tests
//!
//! `ScriptedFactory` hands sessions in-memory sockets. Each accepted socket
//! shows up as a `ServerEnd` the test drives: read what the client sent,
//! push frames, close with a code or drop the connection. Close frames from
//! the client are acknowledged automatically.

#![allow(dead_code)]

use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use geosockets::{CloseFrame, SocketError, SocketFactory, SocketPair, WsMessage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use waypoint::{Credentials, EventName, SessionConfig, StreamEvent};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const SUBSCRIBER_URL: &str = "ws://tracking.test/v1/subscribe";
pub const PUBLISHER_URL: &str = "ws://tracking.test/v1/publish";

/// Configuration pointing at the in-memory endpoints with fast retries
pub fn test_config() -> SessionConfig {
    SessionConfig::new("fleet", Credentials::api_key("test-key"))
        .with_subscriber_url(SUBSCRIBER_URL)
        .with_publisher_url(PUBLISHER_URL)
        .with_reconnect_interval(Duration::from_millis(10))
        .with_max_reconnect_delay(Duration::from_millis(40))
}

/// Outcome of one open() call
#[derive(Debug, Clone)]
pub enum Plan {
    Accept,
    /// Handshake refused with an HTTP status
    Reject(u16),
    /// Socket could not be created
    Fail,
    /// Never completes
    Hang,
}

pub struct ScriptedFactory {
    plans: Mutex<Vec<(Option<&'static str>, Plan)>>,
    attempts: Mutex<Vec<String>>,
    sockets_tx: mpsc::UnboundedSender<ServerEnd>,
}

impl ScriptedFactory {
    pub fn new() -> (Arc<Self>, Sockets) {
        let (sockets_tx, sockets_rx) = mpsc::unbounded_channel();
        let factory = Arc::new(Self {
            plans: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            sockets_tx,
        });
        (factory, Sockets(sockets_rx))
    }

    /// Queue a plan for the next open() to any URL
    pub fn script(&self, plan: Plan) {
        self.plans.lock().push((None, plan));
    }

    /// Queue a plan for the next open() whose URL contains `fragment`
    pub fn script_for(&self, fragment: &'static str, plan: Plan) {
        self.plans.lock().push((Some(fragment), plan));
    }

    /// URLs of every open() call so far
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    fn next_plan(&self, url: &str) -> Plan {
        let mut plans = self.plans.lock();
        let index = plans
            .iter()
            .position(|(fragment, _)| fragment.map_or(true, |f| url.contains(f)));
        match index {
            Some(index) => plans.remove(index).1,
            None => Plan::Accept,
        }
    }
}

#[async_trait::async_trait]
impl SocketFactory for ScriptedFactory {
    async fn open(&self, url: &str) -> geosockets::Result<SocketPair> {
        self.attempts.lock().push(url.to_string());
        let plan = self.next_plan(url);
        verbose_println!("open {} -> {:?}", url, plan);

        match plan {
            Plan::Accept => {}
            Plan::Reject(status) => {
                return Err(SocketError::Rejected {
                    status,
                    reason: "refused".to_string(),
                })
            }
            Plan::Fail => return Err(SocketError::Connection("connection refused".to_string())),
            Plan::Hang => futures::future::pending::<()>().await,
        }

        let (client_tx, mut client_rx) = fmpsc::unbounded::<WsMessage>();
        let (server_tx, server_rx) = fmpsc::unbounded::<geosockets::Result<WsMessage>>();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let outbox = Arc::new(Mutex::new(Some(server_tx)));

        let relay_outbox = Arc::clone(&outbox);
        tokio::spawn(async move {
            while let Some(frame) = client_rx.next().await {
                if let WsMessage::Close(close) = &frame {
                    // Acknowledge and hang up
                    if let Some(tx) = relay_outbox.lock().take() {
                        let _ = tx.unbounded_send(Ok(WsMessage::Close(close.clone())));
                    }
                }
                let _ = inbox_tx.send(frame);
            }
        });

        let _ = self.sockets_tx.send(ServerEnd {
            url: url.to_string(),
            inbox: inbox_rx,
            outbox,
        });

        let sink = client_tx.sink_map_err(|e| SocketError::ConnectionClosed(e.to_string()));
        Ok(SocketPair::new(Box::pin(sink), Box::pin(server_rx)))
    }
}

/// Sockets accepted by a ScriptedFactory, in order
pub struct Sockets(mpsc::UnboundedReceiver<ServerEnd>);

impl Sockets {
    pub async fn next(&mut self) -> ServerEnd {
        tokio::time::timeout(Duration::from_secs(5), self.0.recv())
            .await
            .expect("timed out waiting for a socket")
            .expect("factory dropped")
    }

    pub fn try_next(&mut self) -> Option<ServerEnd> {
        self.0.try_recv().ok()
    }
}

/// Server side of one in-memory socket
pub struct ServerEnd {
    pub url: String,
    inbox: mpsc::UnboundedReceiver<WsMessage>,
    outbox: Arc<Mutex<Option<fmpsc::UnboundedSender<geosockets::Result<WsMessage>>>>>,
}

impl ServerEnd {
    pub fn push(&self, message: WsMessage) {
        if let Some(tx) = self.outbox.lock().as_ref() {
            let _ = tx.unbounded_send(Ok(message));
        }
    }

    pub fn push_json(&self, value: Value) {
        self.push(WsMessage::Text(value.to_string()));
    }

    /// Send a subscription confirmation
    pub fn confirm(&self) {
        self.push_json(json!({"type": "SUBSCRIPTION_CONFIRMATION"}));
    }

    /// Close from the server side with `code`
    pub fn close(&self, code: u16) {
        self.push(WsMessage::Close(Some(CloseFrame::new(code, "server close"))));
        self.outbox.lock().take();
    }

    /// End the stream without a close frame
    pub fn drop_connection(&self) {
        self.outbox.lock().take();
    }

    pub async fn recv(&mut self) -> WsMessage {
        tokio::time::timeout(Duration::from_secs(5), self.inbox.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client socket closed")
    }

    /// Next text frame from the client, parsed as JSON
    pub async fn recv_json(&mut self) -> Value {
        loop {
            if let WsMessage::Text(text) = self.recv().await {
                return serde_json::from_str(&text).expect("client sent invalid JSON");
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<WsMessage> {
        self.inbox.try_recv().ok()
    }
}

/// Record the names of events emitted on `dispatcher`
pub fn record_events(
    dispatcher: &geosockets::EventDispatcher<StreamEvent>,
    names: &[EventName],
) -> Arc<Mutex<Vec<EventName>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for &name in names {
        let log = Arc::clone(&log);
        dispatcher.on(name, move |event: &StreamEvent| {
            use geosockets::Event;
            log.lock().push(event.name());
        });
    }
    log
}

/// Poll until `check` passes (panics after 5s)
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
