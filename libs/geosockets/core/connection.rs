//! Connection manager: one socket, one state machine
//!
//! # Architecture
//!
//! ```text
//! connect() ──> open task ──> SocketFactory::open ──> socket task
//!    ▲  (shared in-flight future)                        │
//!    │                                                   ├─> SessionHandler::handle_message
//! reconnect timer <── schedule_reconnect <── on_close <──┘
//! ```
//!
//! All mutable state sits in one `Core` behind a mutex and every state
//! change goes through `ConnectionState::transition`. Handler callbacks are
//! always invoked with the lock released.

use crate::builder::{states, ConnectionBuilder};
use crate::config::ConnectionConfig;
use crate::connection_state::{AtomicMetrics, ConnectionState};
use crate::traits::*;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// How long disconnect() waits for the server to acknowledge a close frame
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Close code used when a close frame carries no status
const NO_STATUS: u16 = 1005;

type ConnectFuture = Shared<BoxFuture<'static, Result<()>>>;

struct InFlight {
    id: u64,
    attempt: ConnectFuture,
    task: AbortHandle,
}

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

struct Core {
    state: ConnectionState,
    /// Bumped by disconnect(); stale attempts and timers compare against it
    epoch: u64,
    next_attempt: u64,
    in_flight: Option<InFlight>,
    /// Identifies the live socket; late events from older sockets are ignored
    socket_id: u64,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    socket_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    reconnect_attempts: usize,
    connected_at: Option<DateTime<Utc>>,
    close_waiters: Vec<oneshot::Sender<()>>,
}

impl Core {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
            next_attempt: 0,
            in_flight: None,
            socket_id: 0,
            outbound: None,
            socket_task: None,
            reconnect_timer: None,
            reconnect_attempts: 0,
            connected_at: None,
            close_waiters: Vec::new(),
        }
    }

    fn clear_in_flight(&mut self, attempt_id: u64) {
        if self.in_flight.as_ref().is_some_and(|f| f.id == attempt_id) {
            self.in_flight = None;
        }
    }

    fn move_to(&mut self, next: ConnectionState) {
        if let Err(e) = self.state.transition(next) {
            warn!(error = %e, "Rejected connection state transition");
        }
    }
}

enum CloseAction {
    Graceful(Vec<oneshot::Sender<()>>),
    AuthFailure,
    Reconnect(u64),
    Closed,
}

struct Inner {
    config: ConnectionConfig,
    handler: Arc<dyn SessionHandler>,
    metrics: AtomicMetrics,
    core: Mutex<Core>,
}

/// Owns one socket and drives its lifecycle
///
/// Cheap to clone: clones share the same socket and state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Start building a connection manager
    pub fn builder() -> ConnectionBuilder<states::NoUrl, states::NoHandler> {
        ConnectionBuilder::new()
    }

    pub(crate) fn from_parts(config: ConnectionConfig, handler: Arc<dyn SessionHandler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                metrics: AtomicMetrics::new(),
                core: Mutex::new(Core::new()),
            }),
        }
    }

    pub fn url(&self) -> &str {
        self.inner.config.url()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Get current connection state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Reconnection attempts since the last successful open
    pub fn reconnect_attempts(&self) -> usize {
        self.inner.core.lock().reconnect_attempts
    }

    /// When the current socket opened, if connected
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.inner.core.lock().connected_at
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        Metrics {
            messages_sent: self.inner.metrics.messages_sent(),
            messages_received: self.inner.metrics.messages_received(),
            reconnect_count: self.inner.metrics.reconnect_count(),
            connection_state: self.state(),
        }
    }

    /// Open the socket
    ///
    /// Resolves immediately when already connected. While an attempt is in
    /// flight every caller awaits that same attempt, so one manager never
    /// opens two sockets.
    pub async fn connect(&self) -> Result<()> {
        let attempt = {
            let mut core = self.inner.core.lock();
            if core.state.is_connected() {
                return Ok(());
            }
            match &core.in_flight {
                Some(in_flight) => in_flight.attempt.clone(),
                None => {
                    if let Some(timer) = core.reconnect_timer.take() {
                        timer.abort();
                    }
                    // Replacing a lost socket, whoever triggers it, restores session state
                    let recovering = core.state == ConnectionState::Reconnecting;
                    core.state.transition(ConnectionState::Connecting)?;
                    core.next_attempt += 1;
                    let attempt_id = core.next_attempt;
                    let epoch = core.epoch;

                    let task = tokio::spawn(Arc::clone(&self.inner).open(
                        attempt_id,
                        epoch,
                        recovering,
                    ));
                    let abort = task.abort_handle();
                    let attempt: ConnectFuture = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) if e.is_cancelled() => Err(SocketError::Cancelled),
                            Err(e) => {
                                Err(SocketError::Connection(format!("connect task failed: {e}")))
                            }
                        }
                    }
                    .boxed()
                    .shared();

                    core.in_flight = Some(InFlight {
                        id: attempt_id,
                        attempt: attempt.clone(),
                        task: abort,
                    });
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Close the socket and stop reconnecting
    ///
    /// Always ends in `Disconnected`, whatever the starting state. When a
    /// socket is open a normal-closure frame is sent and the server gets
    /// [`CLOSE_GRACE_PERIOD`] to acknowledge it before the socket is
    /// released anyway.
    pub async fn disconnect(&self) {
        let waiter = {
            let mut core = self.inner.core.lock();
            core.epoch += 1;
            // Pending handshakes resolve as Cancelled
            if let Some(in_flight) = core.in_flight.take() {
                in_flight.task.abort();
            }
            if let Some(timer) = core.reconnect_timer.take() {
                timer.abort();
            }

            match core.state {
                ConnectionState::Disconnected => None,
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    core.move_to(ConnectionState::Disconnected);
                    None
                }
                ConnectionState::Connected => {
                    core.move_to(ConnectionState::Closing);
                    let (tx, rx) = oneshot::channel();
                    core.close_waiters.push(tx);
                    let queued = core.outbound.as_ref().is_some_and(|outbound| {
                        outbound
                            .send(WsMessage::Close(Some(CloseFrame::normal())))
                            .is_ok()
                    });
                    if !queued {
                        debug!("Socket writer already stopped, waiting for close");
                    }
                    Some(rx)
                }
                ConnectionState::Closing => {
                    let (tx, rx) = oneshot::channel();
                    core.close_waiters.push(tx);
                    Some(rx)
                }
            }
        };

        if let Some(rx) = waiter {
            if tokio::time::timeout(CLOSE_GRACE_PERIOD, rx).await.is_err() {
                self.inner.force_release();
            }
        }

        debug!(url = %self.inner.config.url, "Disconnected");
    }

    /// Queue a frame for the socket
    pub fn send(&self, message: WsMessage) -> Result<()> {
        let core = self.inner.core.lock();
        if !core.state.is_connected() {
            return Err(SocketError::NotConnected);
        }
        let outbound = core.outbound.as_ref().ok_or(SocketError::NotConnected)?;

        if self.inner.config.debug {
            debug!(frame = ?message, "Outbound frame");
        } else {
            trace!(bytes = message.len(), "Outbound frame");
        }

        outbound
            .send(message)
            .map_err(|_| SocketError::ConnectionClosed("socket writer stopped".into()))
    }

    /// Serialize `value` and queue it as a text frame
    pub fn send_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.send(WsMessage::json(value)?)
    }
}

impl Inner {
    fn authenticated_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.config.url).map_err(|e| {
            SocketError::Configuration(format!("invalid URL {}: {e}", self.config.url))
        })?;
        self.config.auth.authorize(&mut url)?;
        Ok(url.to_string())
    }

    async fn establish(&self) -> Result<SocketPair> {
        let url = self.authenticated_url()?;
        debug!(url = %self.config.url, "Opening socket");

        match tokio::time::timeout(self.config.connect_timeout, self.config.factory.open(&url)).await
        {
            Ok(result) => result,
            Err(_) => Err(SocketError::Timeout(self.config.connect_timeout)),
        }
    }

    /// One connection attempt, run as its own task
    async fn open(self: Arc<Self>, attempt_id: u64, epoch: u64, recovering: bool) -> Result<()> {
        match self.establish().await {
            Ok(pair) => {
                self.on_open(attempt_id, epoch, pair)?;
                if recovering {
                    info!("Reconnected");
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move { handler.handle_reconnected().await });
                }
                Ok(())
            }
            Err(err) => self.on_open_failed(attempt_id, epoch, err),
        }
    }

    fn on_open(self: &Arc<Self>, attempt_id: u64, epoch: u64, pair: SocketPair) -> Result<()> {
        let SocketPair { sink, stream } = pair;
        let (ready_tx, ready_rx) = oneshot::channel();

        {
            let mut core = self.core.lock();
            core.clear_in_flight(attempt_id);

            if core.epoch != epoch || core.state != ConnectionState::Connecting {
                drop(core);
                debug!("Discarding socket opened after disconnect");
                tokio::spawn(async move {
                    let mut sink = sink;
                    let _ = sink.send(WsMessage::Close(Some(CloseFrame::normal()))).await;
                    let _ = sink.close().await;
                });
                return Err(SocketError::Cancelled);
            }

            core.state.transition(ConnectionState::Connected)?;
            core.reconnect_attempts = 0;
            core.connected_at = Some(Utc::now());
            core.socket_id += 1;

            let (tx, rx) = mpsc::unbounded_channel();
            core.outbound = Some(tx);
            let socket_id = core.socket_id;
            core.socket_task = Some(tokio::spawn(Arc::clone(self).run_socket(
                socket_id, sink, stream, rx, ready_rx,
            )));
        }

        info!(url = %self.config.url, "Connected");
        self.handler.handle_lifecycle(LifecycleEvent::Connected);
        // Reading starts only once `connected` has been delivered
        let _ = ready_tx.send(());
        Ok(())
    }

    fn on_open_failed(&self, attempt_id: u64, epoch: u64, err: SocketError) -> Result<()> {
        let err = match err {
            SocketError::Rejected { status, reason } if close_code::is_auth_failure(status) => {
                SocketError::Authentication {
                    code: status,
                    reason,
                }
            }
            other => other,
        };

        {
            let mut core = self.core.lock();
            core.clear_in_flight(attempt_id);
            if core.epoch != epoch || core.state != ConnectionState::Connecting {
                return Err(SocketError::Cancelled);
            }
            core.move_to(ConnectionState::Disconnected);
        }

        if err.is_authentication() {
            error!(error = %err, "Authentication rejected during handshake");
        } else {
            warn!(error = %err, "Connection attempt failed");
        }
        self.handler.handle_lifecycle(LifecycleEvent::Error(err.clone()));
        Err(err)
    }

    async fn run_socket(
        self: Arc<Self>,
        socket_id: u64,
        mut sink: SocketSink,
        mut stream: SocketStream,
        mut outbound: mpsc::UnboundedReceiver<WsMessage>,
        ready: oneshot::Receiver<()>,
    ) {
        let _ = ready.await;

        let (code, reason) = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Close(frame))) => {
                        let frame = frame.unwrap_or_else(|| CloseFrame::new(NO_STATUS, ""));
                        break (frame.code, frame.reason);
                    }
                    Some(Ok(message)) => self.dispatch_inbound(message),
                    Some(Err(e)) => {
                        warn!(error = %e, "Socket error");
                        self.handler.handle_lifecycle(LifecycleEvent::Error(e.clone()));
                        break (close_code::ABNORMAL, e.to_string());
                    }
                    None => break (close_code::ABNORMAL, "connection dropped".to_string()),
                },
                command = outbound.recv() => match command {
                    Some(message) => {
                        let closing = message.is_close();
                        if let Err(e) = sink.send(message).await {
                            warn!(error = %e, "Failed to write frame");
                            self.handler.handle_lifecycle(LifecycleEvent::Error(e.clone()));
                            break (close_code::ABNORMAL, e.to_string());
                        }
                        if !closing {
                            self.metrics.increment_sent();
                        }
                    }
                    None => {
                        // Released by the manager; nobody is listening any more
                        let _ = sink.close().await;
                        return;
                    }
                }
            }
        };

        self.on_close(socket_id, code, reason);
    }

    fn dispatch_inbound(&self, message: WsMessage) {
        self.metrics.increment_received();

        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            WsMessage::Close(_) => return,
        };

        if self.config.debug {
            debug!(payload = %text, "Inbound frame");
        } else {
            trace!(bytes = text.len(), "Inbound frame");
        }

        let value = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Non-JSON payload passed through raw");
                Value::String(text)
            }
        };

        if let Err(e) = self.handler.handle_message(value) {
            error!(error = %e, "Message handler failed");
        }
    }

    fn on_close(self: &Arc<Self>, socket_id: u64, code: u16, reason: String) {
        let action = {
            let mut core = self.core.lock();
            if core.socket_id != socket_id {
                return;
            }
            core.outbound = None;
            core.socket_task = None;
            core.connected_at = None;

            let previous = core.state;
            core.move_to(ConnectionState::Disconnected);

            match previous {
                ConnectionState::Closing => {
                    CloseAction::Graceful(std::mem::take(&mut core.close_waiters))
                }
                _ if close_code::is_auth_failure(code) => CloseAction::AuthFailure,
                ConnectionState::Connected if code != close_code::NORMAL => {
                    CloseAction::Reconnect(core.epoch)
                }
                _ => CloseAction::Closed,
            }
        };

        match action {
            CloseAction::Graceful(waiters) => {
                info!(code, "Connection closed");
                for waiter in waiters {
                    let _ = waiter.send(());
                }
                self.handler
                    .handle_lifecycle(LifecycleEvent::Disconnected { code, reason });
            }
            CloseAction::AuthFailure => {
                error!(code, reason = %reason, "Authentication failure, not reconnecting");
                self.handler
                    .handle_lifecycle(LifecycleEvent::Error(SocketError::Authentication {
                        code,
                        reason,
                    }));
            }
            CloseAction::Reconnect(epoch) => {
                warn!(code, reason = %reason, "Connection lost");
                self.handler
                    .handle_lifecycle(LifecycleEvent::Disconnected { code, reason });
                self.schedule_reconnect(epoch);
            }
            CloseAction::Closed => {
                info!(code, "Connection closed");
                self.handler
                    .handle_lifecycle(LifecycleEvent::Disconnected { code, reason });
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, epoch: u64) {
        let plan = {
            let mut core = self.core.lock();
            if core.epoch != epoch || core.state != ConnectionState::Disconnected {
                return;
            }
            let attempt = core.reconnect_attempts;
            match self.config.reconnect_strategy.next_delay(attempt) {
                Some(delay) => {
                    core.move_to(ConnectionState::Reconnecting);
                    core.reconnect_attempts += 1;
                    Ok((attempt + 1, delay))
                }
                None => Err(attempt),
            }
        };

        let (attempt, delay) = match plan {
            Ok(plan) => plan,
            Err(attempts) => {
                error!(attempts, "Reconnection attempts exhausted");
                self.handler
                    .handle_lifecycle(LifecycleEvent::Error(SocketError::ReconnectionFailed {
                        attempts,
                    }));
                return;
            }
        };

        self.metrics.increment_reconnects();
        info!(attempt, ?delay, "Reconnecting");
        self.handler
            .handle_lifecycle(LifecycleEvent::Reconnecting { attempt, delay });

        let mut core = self.core.lock();
        if core.epoch == epoch && core.state == ConnectionState::Reconnecting {
            core.reconnect_timer = Some(tokio::spawn(Arc::clone(self).reconnect_after(delay, epoch)));
        }
    }

    async fn reconnect_after(self: Arc<Self>, delay: Duration, epoch: u64) {
        tokio::time::sleep(delay).await;

        {
            let mut core = self.core.lock();
            if core.epoch != epoch || core.state != ConnectionState::Reconnecting {
                return;
            }
            // From here on the attempt is no longer a pending timer
            core.reconnect_timer = None;
        }

        let manager = ConnectionManager {
            inner: Arc::clone(&self),
        };
        match manager.connect().await {
            Ok(()) => {}
            Err(SocketError::Cancelled) => debug!("Reconnection cancelled"),
            Err(e) if e.is_fatal() => debug!(error = %e, "Stopping reconnection"),
            Err(e) => {
                warn!(error = %e, "Reconnection attempt failed");
                self.schedule_reconnect(epoch);
            }
        }
    }

    fn force_release(&self) {
        let waiters = {
            let mut core = self.core.lock();
            if core.state != ConnectionState::Closing {
                return;
            }
            warn!("Close handshake timed out, releasing socket");
            core.socket_id += 1;
            core.outbound = None;
            if let Some(task) = core.socket_task.take() {
                task.abort();
            }
            core.connected_at = None;
            core.move_to(ConnectionState::Disconnected);
            std::mem::take(&mut core.close_waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}
