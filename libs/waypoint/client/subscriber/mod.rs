//! Subscriber channel
//!
//! Live position, zone, alert and asset events for one namespace.

pub mod subscriber_ws;
pub mod types;

pub use subscriber_ws::{SubscriberSession, CONFIRMATION_TIMEOUT};
pub use types::{
    AlertMessage, AssetMessage, InboundMessage, PositionUpdate, PositionsMessage, SubscribeAck,
    SubscribeRequest, SubscriptionConfirmation, SubscriptionType, ZoneEntryExitMessage,
    ZoneStatsMessage,
};
