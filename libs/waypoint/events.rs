//! Events emitted by tracking sessions
//!
//! Every session owns an `EventDispatcher<StreamEvent>`; callers register
//! handlers by [`EventName`] and match on the variant they registered for.

use crate::client::subscriber::types::{
    AlertMessage, AssetMessage, PositionsMessage, ZoneEntryExitMessage, ZoneStatsMessage,
};
use crate::error::TrackingError;
use geosockets::{Event, LifecycleEvent};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum StreamEvent {
    Connected,
    Disconnected { code: u16, reason: String },
    Reconnecting { attempt: usize, delay: Duration },
    Error(TrackingError),
    /// Every inbound payload, before classification
    Message(Value),
    Positions(PositionsMessage),
    ZoneEntryExit(ZoneEntryExitMessage),
    ZoneStats(ZoneStatsMessage),
    Alert(AlertMessage),
    Asset(AssetMessage),
}

/// Discriminant of [`StreamEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connected,
    Disconnected,
    Reconnecting,
    Error,
    Message,
    Positions,
    ZoneEntryExit,
    ZoneStats,
    Alert,
    Asset,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Connected => "connected",
            EventName::Disconnected => "disconnected",
            EventName::Reconnecting => "reconnecting",
            EventName::Error => "error",
            EventName::Message => "message",
            EventName::Positions => "positions",
            EventName::ZoneEntryExit => "zoneEntryExit",
            EventName::ZoneStats => "zoneStats",
            EventName::Alert => "alert",
            EventName::Asset => "asset",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event for StreamEvent {
    type Name = EventName;

    fn name(&self) -> EventName {
        match self {
            StreamEvent::Connected => EventName::Connected,
            StreamEvent::Disconnected { .. } => EventName::Disconnected,
            StreamEvent::Reconnecting { .. } => EventName::Reconnecting,
            StreamEvent::Error(_) => EventName::Error,
            StreamEvent::Message(_) => EventName::Message,
            StreamEvent::Positions(_) => EventName::Positions,
            StreamEvent::ZoneEntryExit(_) => EventName::ZoneEntryExit,
            StreamEvent::ZoneStats(_) => EventName::ZoneStats,
            StreamEvent::Alert(_) => EventName::Alert,
            StreamEvent::Asset(_) => EventName::Asset,
        }
    }
}

impl From<LifecycleEvent> for StreamEvent {
    fn from(event: LifecycleEvent) -> Self {
        match event {
            LifecycleEvent::Connected => StreamEvent::Connected,
            LifecycleEvent::Disconnected { code, reason } => {
                StreamEvent::Disconnected { code, reason }
            }
            LifecycleEvent::Reconnecting { attempt, delay } => {
                StreamEvent::Reconnecting { attempt, delay }
            }
            LifecycleEvent::Error(e) => StreamEvent::Error(e.into()),
        }
    }
}
