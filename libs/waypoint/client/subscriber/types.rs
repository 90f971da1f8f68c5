//! Subscriber Channel Message Types
//!
//! Outbound subscribe requests, confirmation shapes and the typed domain
//! messages pushed by the subscriber endpoint.

use crate::error::TrackingError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Subscription Types
// =============================================================================

/// Event families a subscriber can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionType {
    Positions,
    ZoneEntryExit,
    ZoneStats,
    Alerts,
    Assets,
}

impl SubscriptionType {
    pub const ALL: [SubscriptionType; 5] = [
        SubscriptionType::Positions,
        SubscriptionType::ZoneEntryExit,
        SubscriptionType::ZoneStats,
        SubscriptionType::Alerts,
        SubscriptionType::Assets,
    ];

    /// Wire name, e.g. `"ZONE_ENTRY_EXIT"`
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionType::Positions => "POSITIONS",
            SubscriptionType::ZoneEntryExit => "ZONE_ENTRY_EXIT",
            SubscriptionType::ZoneStats => "ZONE_STATS",
            SubscriptionType::Alerts => "ALERTS",
            SubscriptionType::Assets => "ASSETS",
        }
    }

    pub fn all() -> BTreeSet<SubscriptionType> {
        Self::ALL.into_iter().collect()
    }

    /// Discriminant values found on inbound messages (singular forms included)
    fn from_discriminant(value: &str) -> Option<Self> {
        match value {
            "POSITIONS" | "POSITION" => Some(SubscriptionType::Positions),
            "ZONE_ENTRY_EXIT" => Some(SubscriptionType::ZoneEntryExit),
            "ZONE_STATS" => Some(SubscriptionType::ZoneStats),
            "ALERTS" | "ALERT" => Some(SubscriptionType::Alerts),
            "ASSETS" | "ASSET" => Some(SubscriptionType::Assets),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionType {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TrackingError::Subscription(format!("unknown subscription type {s:?}")))
    }
}

// =============================================================================
// Subscribe Request / Confirmation
// =============================================================================

/// Subscribe request sent to the subscriber endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub app_namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_uuid: Option<String>,
    /// Omitted when every type is requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type_filter: Option<Vec<SubscriptionType>>,
}

impl SubscribeRequest {
    pub fn new(
        namespace: impl Into<String>,
        map_uuid: Option<String>,
        types: &BTreeSet<SubscriptionType>,
    ) -> Self {
        let covers_all = SubscriptionType::ALL.iter().all(|t| types.contains(t));
        Self {
            msg_type: "SUBSCRIBE",
            app_namespace: namespace.into(),
            map_uuid,
            data_type_filter: (!covers_all).then(|| types.iter().copied().collect()),
        }
    }
}

/// Server acknowledgement of a subscribe request
///
/// Two historical shapes are accepted:
/// `{"type": "SUBSCRIPTION_CONFIRMATION", "types": [...]}` and
/// `{"action": "subscribeEvent"}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscriptionConfirmation {
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub app_namespace: Option<String>,
}

impl SubscriptionConfirmation {
    pub fn matches(value: &Value) -> bool {
        value.get("type").and_then(Value::as_str) == Some("SUBSCRIPTION_CONFIRMATION")
            || value.get("action").and_then(Value::as_str) == Some("subscribeEvent")
    }
}

/// Outcome of a confirmed subscribe()
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeAck {
    pub success: bool,
    pub types: Vec<SubscriptionType>,
}

// =============================================================================
// Domain Messages
// =============================================================================

/// One device position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(default)]
    pub user_uuid: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub map_uuid: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A batch of positions (single positions arrive as a batch of one)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionsMessage {
    pub positions: Vec<PositionUpdate>,
}

/// A device entering or leaving a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEntryExitMessage {
    #[serde(default)]
    pub zone_uuid: Option<String>,
    #[serde(default)]
    pub zone_name: Option<String>,
    #[serde(default)]
    pub user_uuid: Option<String>,
    /// `ENTRY` or `EXIT`
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Occupancy statistics for a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatsMessage {
    #[serde(default)]
    pub zone_uuid: Option<String>,
    #[serde(default)]
    pub zone_name: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMessage {
    #[serde(default)]
    pub asset_uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Classification
// =============================================================================

/// An inbound message after classification
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Confirmation(SubscriptionConfirmation),
    Positions(PositionsMessage),
    ZoneEntryExit(ZoneEntryExitMessage),
    ZoneStats(ZoneStatsMessage),
    Alert(AlertMessage),
    Asset(AssetMessage),
    Unknown,
}

impl InboundMessage {
    /// Classify a parsed payload
    ///
    /// Order of checks: confirmation shape, explicit `type`/`data_type`
    /// discriminant, then content-shape inference.
    pub fn classify(value: &Value) -> Self {
        if !value.is_object() {
            return InboundMessage::Unknown;
        }

        if SubscriptionConfirmation::matches(value) {
            return serde_json::from_value(value.clone())
                .map(InboundMessage::Confirmation)
                .unwrap_or_else(|_| InboundMessage::Confirmation(Default::default()));
        }

        let kind = discriminant(value).or_else(|| infer_kind(value));
        match kind {
            Some(kind) => Self::parse_as(kind, value).unwrap_or(InboundMessage::Unknown),
            None => InboundMessage::Unknown,
        }
    }

    fn parse_as(kind: SubscriptionType, value: &Value) -> Option<Self> {
        let body = payload(value);
        let message = match kind {
            SubscriptionType::Positions => InboundMessage::Positions(parse_positions(value)?),
            SubscriptionType::ZoneEntryExit => {
                InboundMessage::ZoneEntryExit(serde_json::from_value(body).ok()?)
            }
            SubscriptionType::ZoneStats => {
                InboundMessage::ZoneStats(serde_json::from_value(body).ok()?)
            }
            SubscriptionType::Alerts => InboundMessage::Alert(serde_json::from_value(body).ok()?),
            SubscriptionType::Assets => InboundMessage::Asset(serde_json::from_value(body).ok()?),
        };
        Some(message)
    }
}

fn discriminant(value: &Value) -> Option<SubscriptionType> {
    ["type", "data_type"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find_map(SubscriptionType::from_discriminant)
}

fn infer_kind(value: &Value) -> Option<SubscriptionType> {
    let has = |key: &str| value.get(key).is_some_and(|v| !v.is_null());

    if value.get("positions").is_some_and(Value::is_array) || (has("lat") && has("lon")) {
        Some(SubscriptionType::Positions)
    } else if has("zone_uuid") && has("event") {
        Some(SubscriptionType::ZoneEntryExit)
    } else if has("zone_uuid") && has("count") {
        Some(SubscriptionType::ZoneStats)
    } else if has("alert_type") || has("severity") {
        Some(SubscriptionType::Alerts)
    } else if has("asset_uuid") {
        Some(SubscriptionType::Assets)
    } else {
        None
    }
}

/// Enveloped messages carry the record under `data`
fn payload(value: &Value) -> Value {
    match value.get("data") {
        Some(data) if data.is_object() => data.clone(),
        _ => value.clone(),
    }
}

fn parse_positions(value: &Value) -> Option<PositionsMessage> {
    let list = value
        .get("positions")
        .or_else(|| value.get("data"))
        .and_then(Value::as_array);

    let positions = match list {
        Some(items) => items
            .iter()
            .map(|item| serde_json::from_value(item.clone()))
            .collect::<Result<Vec<PositionUpdate>, _>>()
            .ok()?,
        None => vec![serde_json::from_value(payload(value)).ok()?],
    };

    Some(PositionsMessage { positions })
}
