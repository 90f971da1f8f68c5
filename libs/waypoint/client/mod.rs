//! Tracking sessions
//!
//! - [`SubscriberSession`]: live positions, zone, alert and asset events
//! - [`PublisherSession`]: inject external positions
//! - [`TrackingSession`]: one of each behind a single handle

pub mod publisher;
pub mod subscriber;
pub mod unified;

pub use publisher::{
    BatchItemError, BatchResult, DeviceInfo, PositionEnvelope, PositionInput, PublishResult,
    PublisherSession,
};
pub use subscriber::{SubscribeAck, SubscriberSession, SubscriptionType};
pub use unified::{ConnectOptions, TrackingSession};

use crate::config::SessionConfig;
use geosockets::builder::states::{HasUrl, NoHandler};
use geosockets::{ConnectionBuilder, ConnectionManager, SocketFactory};
use std::sync::Arc;

/// Connection builder carrying everything but the handler
pub(crate) fn connection_builder(
    config: &SessionConfig,
    url: &str,
    factory: Option<Arc<dyn SocketFactory>>,
) -> ConnectionBuilder<HasUrl, NoHandler> {
    let builder = ConnectionManager::builder()
        .url(url)
        .auth(config.credentials.to_auth())
        .reconnect_strategy(config.reconnect_strategy())
        .connect_timeout(config.connect_timeout)
        .debug(config.debug);

    match factory {
        Some(factory) => builder.factory(factory),
        None => builder,
    }
}
