//! Subscriber session
//!
//! Wraps a ConnectionManager and speaks the subscribe/confirmation protocol
//! on top of it:
//!
//! 1. `subscribe()` sends a SUBSCRIBE request and records the requested set
//!    as active right away
//! 2. The returned future resolves when a confirmation message arrives, or
//!    fails after [`CONFIRMATION_TIMEOUT`]
//! 3. After a reconnection the active set is re-subscribed automatically
//!
//! Only one subscribe handshake is tracked at a time. A newer `subscribe()`
//! replaces a pending one, which then fails with
//! [`TrackingError::Superseded`].
//!
//! Types become active when the request is sent, not when the server
//! confirms them, so `active_subscriptions()` and the reconnection
//! re-subscribe can include types the server never acknowledged.

use super::types::{InboundMessage, SubscribeAck, SubscribeRequest, SubscriptionConfirmation, SubscriptionType};
use crate::client::connection_builder;
use crate::config::SessionConfig;
use crate::error::{Result, TrackingError};
use crate::events::{EventName, StreamEvent};
use chrono::{DateTime, Utc};
use geosockets::{
    ConnectionManager, ConnectionState, EventDispatcher, LifecycleEvent, ListenerId, Metrics,
    SessionHandler, SocketFactory, Unsubscribe,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How long subscribe() waits for the server's confirmation
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(10);

type ConfirmationResult = std::result::Result<SubscriptionConfirmation, TrackingError>;

struct PendingConfirmation {
    id: u64,
    tx: oneshot::Sender<ConfirmationResult>,
}

#[derive(Default)]
struct SubscriptionState {
    active: BTreeSet<SubscriptionType>,
    pending: Option<PendingConfirmation>,
    next_id: u64,
}

struct SubscriberInner {
    config: SessionConfig,
    connection: ConnectionManager,
    events: EventDispatcher<StreamEvent>,
    subscriptions: Mutex<SubscriptionState>,
}

/// Handler installed on the connection manager
struct SubscriberHandler {
    session: Weak<SubscriberInner>,
}

#[async_trait::async_trait]
impl SessionHandler for SubscriberHandler {
    fn handle_message(&self, message: Value) -> geosockets::Result<()> {
        if let Some(session) = self.session.upgrade() {
            session.handle_message(message);
        }
        Ok(())
    }

    fn handle_lifecycle(&self, event: LifecycleEvent) {
        if let Some(session) = self.session.upgrade() {
            session.events.emit(&StreamEvent::from(event));
        }
    }

    async fn handle_reconnected(&self) {
        if let Some(session) = self.session.upgrade() {
            session.resubscribe().await;
        }
    }
}

/// Receives live tracking events
///
/// Cheap to clone; clones share the connection and subscriptions.
#[derive(Clone)]
pub struct SubscriberSession {
    inner: Arc<SubscriberInner>,
}

impl SubscriberSession {
    /// Create a session using real WebSocket connections
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a session whose sockets come from `factory`
    pub fn with_factory(config: SessionConfig, factory: Arc<dyn SocketFactory>) -> Result<Self> {
        Self::build(config, Some(factory))
    }

    fn build(config: SessionConfig, factory: Option<Arc<dyn SocketFactory>>) -> Result<Self> {
        config.validate()?;
        let builder = connection_builder(&config, &config.subscriber_url, factory);

        let inner = Arc::new_cyclic(|weak: &Weak<SubscriberInner>| {
            let handler = Arc::new(SubscriberHandler {
                session: weak.clone(),
            });
            SubscriberInner {
                connection: builder.handler(handler).build(),
                config,
                events: EventDispatcher::new(),
                subscriptions: Mutex::new(SubscriptionState::default()),
            }
        });

        Ok(Self { inner })
    }

    pub async fn connect(&self) -> Result<()> {
        Ok(self.inner.connection.connect().await?)
    }

    pub async fn disconnect(&self) {
        self.inner.connection.disconnect().await
    }

    /// Subscribe to `types`; an empty slice means every type
    ///
    /// Resolves once the server confirms. Fails with `SubscriptionTimeout`
    /// after [`CONFIRMATION_TIMEOUT`] and with `Superseded` when another
    /// subscribe() replaces this one first.
    pub async fn subscribe(&self, types: &[SubscriptionType]) -> Result<SubscribeAck> {
        let requested = if types.is_empty() {
            SubscriptionType::all()
        } else {
            types.iter().copied().collect()
        };
        self.inner.subscribe_set(requested).await
    }

    /// Subscribe using wire names such as `"POSITIONS"`
    ///
    /// Every name is validated before anything is sent.
    pub async fn subscribe_named(&self, names: &[&str]) -> Result<SubscribeAck> {
        let types = names
            .iter()
            .map(|name| name.parse::<SubscriptionType>())
            .collect::<Result<Vec<_>>>()?;
        self.subscribe(&types).await
    }

    /// Drop `types` from the active set
    ///
    /// There is no partial unsubscribe on the wire: when types remain and
    /// the session is connected, the remaining set is subscribed again.
    /// Returns the types still active.
    pub async fn unsubscribe(&self, types: &[SubscriptionType]) -> Result<Vec<SubscriptionType>> {
        let remaining = {
            let mut subscriptions = self.inner.subscriptions.lock();
            for t in types {
                subscriptions.active.remove(t);
            }
            subscriptions.active.clone()
        };
        info!(removed = ?types, remaining = ?remaining, "Unsubscribed");

        if !remaining.is_empty() && self.inner.connection.is_connected() {
            self.inner.subscribe_set(remaining.clone()).await?;
        }
        Ok(remaining.into_iter().collect())
    }

    /// Types recorded as active (optimistically, at send time)
    pub fn active_subscriptions(&self) -> Vec<SubscriptionType> {
        self.inner.subscriptions.lock().active.iter().copied().collect()
    }

    /// Whether a subscribe handshake is awaiting confirmation
    pub fn has_pending_subscription(&self) -> bool {
        self.inner.subscriptions.lock().pending.is_some()
    }

    pub fn on<F>(&self, name: EventName, handler: F) -> Unsubscribe<StreamEvent>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(name, handler)
    }

    pub fn once<F>(&self, name: EventName, handler: F) -> Unsubscribe<StreamEvent>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.inner.events.once(name, handler)
    }

    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        self.inner.events.off(name, id)
    }

    pub fn events(&self) -> &EventDispatcher<StreamEvent> {
        &self.inner.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.inner.connection.reconnect_attempts()
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.inner.connection.connected_at()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.connection.metrics()
    }
}

impl SubscriberInner {
    async fn subscribe_set(&self, requested: BTreeSet<SubscriptionType>) -> Result<SubscribeAck> {
        let request = SubscribeRequest::new(
            self.config.namespace.clone(),
            self.config.map_uuid.clone(),
            &requested,
        );

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.next_id += 1;
            let id = subscriptions.next_id;
            if let Some(previous) = subscriptions.pending.replace(PendingConfirmation { id, tx }) {
                debug!(superseded = previous.id, "Replacing pending subscription");
                let _ = previous.tx.send(Err(TrackingError::Superseded));
            }
            id
        };

        if let Err(e) = self.connection.send_json(&request) {
            self.clear_pending(id);
            return Err(e.into());
        }
        self.subscriptions.lock().active = requested.clone();
        info!(types = ?requested, "Subscribe request sent");

        match tokio::time::timeout(CONFIRMATION_TIMEOUT, rx).await {
            Ok(Ok(Ok(_confirmation))) => {
                info!(types = ?requested, "Subscription confirmed");
                Ok(SubscribeAck {
                    success: true,
                    types: requested.into_iter().collect(),
                })
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(TrackingError::Subscription(
                "confirmation channel dropped".to_string(),
            )),
            Err(_) => {
                self.clear_pending(id);
                warn!(timeout = ?CONFIRMATION_TIMEOUT, "Subscription not confirmed");
                Err(TrackingError::SubscriptionTimeout(CONFIRMATION_TIMEOUT))
            }
        }
    }

    fn clear_pending(&self, id: u64) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.pending.as_ref().is_some_and(|p| p.id == id) {
            subscriptions.pending = None;
        }
    }

    fn handle_message(&self, message: Value) {
        let classified = InboundMessage::classify(&message);
        self.events.emit(&StreamEvent::Message(message));

        let event = match classified {
            InboundMessage::Confirmation(confirmation) => {
                self.resolve_pending(confirmation);
                return;
            }
            InboundMessage::Positions(p) => StreamEvent::Positions(p),
            InboundMessage::ZoneEntryExit(z) => StreamEvent::ZoneEntryExit(z),
            InboundMessage::ZoneStats(z) => StreamEvent::ZoneStats(z),
            InboundMessage::Alert(a) => StreamEvent::Alert(a),
            InboundMessage::Asset(a) => StreamEvent::Asset(a),
            InboundMessage::Unknown => {
                debug!("Dropping unclassified message");
                return;
            }
        };
        self.events.emit(&event);
    }

    fn resolve_pending(&self, confirmation: SubscriptionConfirmation) {
        let pending = self.subscriptions.lock().pending.take();
        match pending {
            Some(pending) => {
                let _ = pending.tx.send(Ok(confirmation));
            }
            None => debug!("Confirmation without a pending subscription"),
        }
    }

    async fn resubscribe(&self) {
        let active = self.subscriptions.lock().active.clone();
        if active.is_empty() {
            return;
        }

        info!(types = ?active, "Restoring subscriptions after reconnect");
        if let Err(e) = self.subscribe_set(active).await {
            warn!(error = %e, "Failed to restore subscriptions");
            self.events.emit(&StreamEvent::Error(e));
        }
    }
}
