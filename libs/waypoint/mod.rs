//! # Waypoint
//!
//! Realtime sessions for the Waypoint location-tracking platform.
//!
//! - [`SubscriberSession`]: subscribe to positions, zone, alert and asset events
//! - [`PublisherSession`]: publish external device positions
//! - [`TrackingSession`]: both, connected and torn down together
//!
//! ## Example
//!
//! ```rust,ignore
//! use waypoint::*;
//!
//! let config = SessionConfig::from_env()?;
//! let session = TrackingSession::new(config)?;
//! session.on(EventName::Positions, |event| {
//!     if let StreamEvent::Positions(batch) = event {
//!         println!("{} positions", batch.positions.len());
//!     }
//! });
//! session.connect(ConnectOptions::default()).await?;
//! session.subscribe(&[SubscriptionType::Positions]).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use client::publisher::{
    normalize_device_id, BatchItemError, BatchResult, DeviceInfo, PositionEnvelope,
    PositionInput, PublishResult, PublisherSession, DEFAULT_COLOR, EXTERNAL_ORIGIN,
};
pub use client::subscriber::{
    InboundMessage, PositionUpdate, PositionsMessage, SubscribeAck, SubscriberSession,
    SubscriptionType, CONFIRMATION_TIMEOUT,
};
pub use client::unified::{ConnectOptions, TrackingSession};
pub use config::{ConfigError, Credentials, SessionConfig};
pub use error::{Result, TrackingError};
pub use events::{EventName, StreamEvent};
pub use logging::{init_tracing, init_tracing_with};
