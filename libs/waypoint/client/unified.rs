//! Unified session: one subscriber plus an optional publisher
//!
//! The publisher side exists only when the configuration carries a
//! `map_uuid`. Without it, publish calls return a "publisher not
//! configured" failure result.

use crate::client::publisher::{BatchResult, PositionInput, PublishResult, PublisherSession};
use crate::client::subscriber::{SubscribeAck, SubscriberSession, SubscriptionType};
use crate::config::{ConfigError, SessionConfig};
use crate::error::{Result, TrackingError};
use crate::events::{EventName, StreamEvent};
use geosockets::{ListenerId, SocketFactory, Unsubscribe};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Which sides `connect()` should open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub publisher_only: bool,
    pub subscriber_only: bool,
}

impl ConnectOptions {
    pub fn publisher_only() -> Self {
        Self {
            publisher_only: true,
            subscriber_only: false,
        }
    }

    pub fn subscriber_only() -> Self {
        Self {
            publisher_only: false,
            subscriber_only: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Touched {
    subscriber: bool,
    publisher: bool,
}

/// Subscriber and publisher behind one handle
pub struct TrackingSession {
    subscriber: SubscriberSession,
    publisher: Option<PublisherSession>,
    touched: Mutex<Touched>,
}

impl TrackingSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let publisher = match config.map_uuid {
            Some(_) => Some(PublisherSession::new(config.clone())?),
            None => None,
        };
        Ok(Self {
            subscriber: SubscriberSession::new(config)?,
            publisher,
            touched: Mutex::new(Touched::default()),
        })
    }

    /// Both sides open their sockets through `factory`
    pub fn with_factory(config: SessionConfig, factory: Arc<dyn SocketFactory>) -> Result<Self> {
        let publisher = match config.map_uuid {
            Some(_) => Some(PublisherSession::with_factory(
                config.clone(),
                Arc::clone(&factory),
            )?),
            None => None,
        };
        Ok(Self {
            subscriber: SubscriberSession::with_factory(config, factory)?,
            publisher,
            touched: Mutex::new(Touched::default()),
        })
    }

    /// Connect the selected sides concurrently; fails if any of them fails
    pub async fn connect(&self, options: ConnectOptions) -> Result<()> {
        if options.publisher_only && options.subscriber_only {
            return Err(TrackingError::Config(ConfigError::ValidationError(
                "publisher_only and subscriber_only are mutually exclusive".to_string(),
            )));
        }
        if options.publisher_only && self.publisher.is_none() {
            return Err(TrackingError::PublisherNotConfigured);
        }

        let want_subscriber = !options.publisher_only;
        let publisher = self.publisher.as_ref().filter(|_| !options.subscriber_only);

        {
            let mut touched = self.touched.lock();
            touched.subscriber |= want_subscriber;
            touched.publisher |= publisher.is_some();
        }

        let subscriber_side = async {
            if want_subscriber {
                self.subscriber.connect().await
            } else {
                Ok(())
            }
        };
        let publisher_side = async {
            match publisher {
                Some(publisher) => publisher.connect().await,
                None => Ok(()),
            }
        };

        // Both sides settle before the first failure is reported
        let (subscriber_result, publisher_result) = futures::join!(subscriber_side, publisher_side);
        subscriber_result.and(publisher_result)?;
        info!(
            subscriber = want_subscriber,
            publisher = publisher.is_some(),
            "Tracking session connected"
        );
        Ok(())
    }

    /// Disconnect every side that was ever connected; safe to repeat
    pub async fn disconnect(&self) {
        let touched = *self.touched.lock();

        let subscriber_side = async {
            if touched.subscriber {
                self.subscriber.disconnect().await;
            }
        };
        let publisher_side = async {
            if let Some(publisher) = self.publisher.as_ref().filter(|_| touched.publisher) {
                publisher.disconnect().await;
            }
        };

        futures::join!(subscriber_side, publisher_side);
    }

    /// True only when every configured side is connected
    pub fn is_connected(&self) -> bool {
        self.subscriber.is_connected()
            && self.publisher.as_ref().map_or(true, PublisherSession::is_connected)
    }

    pub async fn subscribe(&self, types: &[SubscriptionType]) -> Result<SubscribeAck> {
        self.subscriber.subscribe(types).await
    }

    pub async fn subscribe_named(&self, names: &[&str]) -> Result<SubscribeAck> {
        self.subscriber.subscribe_named(names).await
    }

    pub async fn unsubscribe(&self, types: &[SubscriptionType]) -> Result<Vec<SubscriptionType>> {
        self.subscriber.unsubscribe(types).await
    }

    pub fn active_subscriptions(&self) -> Vec<SubscriptionType> {
        self.subscriber.active_subscriptions()
    }

    pub fn on<F>(&self, name: EventName, handler: F) -> Unsubscribe<StreamEvent>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.subscriber.on(name, handler)
    }

    pub fn once<F>(&self, name: EventName, handler: F) -> Unsubscribe<StreamEvent>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.subscriber.once(name, handler)
    }

    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        self.subscriber.off(name, id)
    }

    pub async fn send_position(&self, position: PositionInput) -> PublishResult {
        match &self.publisher {
            Some(publisher) => {
                self.touched.lock().publisher = true;
                publisher.send_position(position).await
            }
            None => PublishResult::failure(TrackingError::PublisherNotConfigured),
        }
    }

    pub async fn send_batch(&self, positions: Vec<PositionInput>) -> BatchResult {
        match &self.publisher {
            Some(publisher) => {
                self.touched.lock().publisher = true;
                publisher.send_batch(positions).await
            }
            None => BatchResult::all_failed(&positions, TrackingError::PublisherNotConfigured),
        }
    }

    pub fn subscriber(&self) -> &SubscriberSession {
        &self.subscriber
    }

    pub fn publisher(&self) -> Option<&PublisherSession> {
        self.publisher.as_ref()
    }
}
