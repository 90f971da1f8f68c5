//! Publisher session
//!
//! Publishes external positions. Every publish operation reports its
//! outcome as a [`PublishResult`] / [`BatchResult`] value: connection
//! failures, malformed identifiers and send errors never escape as errors.

use super::types::{BatchItemError, BatchResult, PositionEnvelope, PositionInput, PublishResult};
use crate::client::connection_builder;
use crate::config::SessionConfig;
use crate::error::{Result, TrackingError};
use crate::events::{EventName, StreamEvent};
use chrono::{DateTime, Utc};
use geosockets::{
    ConnectionManager, ConnectionState, EventDispatcher, LifecycleEvent, ListenerId, Metrics,
    SessionHandler, SocketFactory, Unsubscribe,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Forwards publisher traffic to the session's dispatcher
struct PublisherHandler {
    events: EventDispatcher<StreamEvent>,
}

#[async_trait::async_trait]
impl SessionHandler for PublisherHandler {
    fn handle_message(&self, message: Value) -> geosockets::Result<()> {
        debug!("Publisher received a message");
        self.events.emit(&StreamEvent::Message(message));
        Ok(())
    }

    fn handle_lifecycle(&self, event: LifecycleEvent) {
        self.events.emit(&StreamEvent::from(event));
    }
}

/// Sends position envelopes to the publisher endpoint
#[derive(Clone)]
pub struct PublisherSession {
    config: Arc<SessionConfig>,
    connection: ConnectionManager,
    events: EventDispatcher<StreamEvent>,
}

impl PublisherSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::build(config, None)
    }

    pub fn with_factory(config: SessionConfig, factory: Arc<dyn SocketFactory>) -> Result<Self> {
        Self::build(config, Some(factory))
    }

    fn build(config: SessionConfig, factory: Option<Arc<dyn SocketFactory>>) -> Result<Self> {
        config.validate()?;
        let events = EventDispatcher::new();
        let handler = Arc::new(PublisherHandler {
            events: events.clone(),
        });
        let connection = connection_builder(&config, &config.publisher_url, factory)
            .handler(handler)
            .build();

        Ok(Self {
            config: Arc::new(config),
            connection,
            events,
        })
    }

    pub async fn connect(&self) -> Result<()> {
        Ok(self.connection.connect().await?)
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    /// Publish one position, connecting first if needed
    pub async fn send_position(&self, position: PositionInput) -> PublishResult {
        let device_id = position.device_id.clone();
        let envelope = match PositionEnvelope::build(&self.config, position, Utc::now()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Rejected position");
                return PublishResult::failure(e);
            }
        };

        if let Err(e) = self.ensure_connected().await {
            warn!(error = %e, "Publisher could not connect");
            return PublishResult::failure(e);
        }

        match self.publish(&envelope) {
            Ok(()) => PublishResult::ok(),
            Err(e) => PublishResult::failure(e),
        }
    }

    /// Publish many positions over one connection
    ///
    /// Items fail independently; a connection failure fails the whole batch.
    pub async fn send_batch(&self, positions: Vec<PositionInput>) -> BatchResult {
        if positions.is_empty() {
            return BatchResult::from_outcomes(0, Vec::new());
        }

        if let Err(e) = self.ensure_connected().await {
            warn!(error = %e, items = positions.len(), "Batch failed: publisher could not connect");
            return BatchResult::all_failed(&positions, e);
        }

        let now = Utc::now();
        let mut sent = 0;
        let mut errors = Vec::new();

        for position in positions {
            let device_id = position.device_id.clone();
            let outcome = PositionEnvelope::build(&self.config, position, now)
                .and_then(|envelope| self.publish(&envelope));
            match outcome {
                Ok(()) => sent += 1,
                Err(e) => errors.push(BatchItemError {
                    device_id,
                    error: e.to_string(),
                }),
            }
        }

        let result = BatchResult::from_outcomes(sent, errors);
        info!(sent = result.sent, failed = result.failed, "Batch published");
        result
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.connection.is_connected() {
            return Ok(());
        }
        Ok(self.connection.connect().await?)
    }

    fn publish(&self, envelope: &PositionEnvelope) -> Result<()> {
        self.connection
            .send_json(envelope)
            .map_err(|e| TrackingError::Send(e.to_string()))
    }

    pub fn on<F>(&self, name: EventName, handler: F) -> Unsubscribe<StreamEvent>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.events.on(name, handler)
    }

    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        self.events.off(name, id)
    }

    pub fn events(&self) -> &EventDispatcher<StreamEvent> {
        &self.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.connection.reconnect_attempts()
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connection.connected_at()
    }

    pub fn metrics(&self) -> Metrics {
        self.connection.metrics()
    }
}
