//! Publisher Channel Message Types

use crate::config::SessionConfig;
use crate::error::TrackingError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Origin tag marking a position as externally published
pub const EXTERNAL_ORIGIN: u8 = 2;

/// Color used when the caller does not pick one
pub const DEFAULT_COLOR: &str = "#1E88E5";

/// Model reported for externally published devices
pub const DEFAULT_MODEL: &str = "external";

// =============================================================================
// Device Identifier
// =============================================================================

/// Reduce a MAC-style identifier to 12 lowercase hex characters
///
/// Colon, dash and dot separators are stripped:
/// `"AA:BB:CC:DD:EE:FF"`, `"aa-bb-cc-dd-ee-ff"` and `"aabb.ccdd.eeff"`
/// all become `"aabbccddeeff"`.
pub fn normalize_device_id(raw: &str) -> Result<String, TrackingError> {
    let normalized: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if normalized.len() == 12 && normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(normalized)
    } else {
        Err(TrackingError::InvalidDeviceId(raw.to_string()))
    }
}

// =============================================================================
// Position Input / Envelope
// =============================================================================

/// Device descriptor sent with every position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub build: String,
    pub system_name: String,
    pub system_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            build: "1".to_string(),
            system_name: "external".to_string(),
            system_version: "1.0".to_string(),
        }
    }
}

/// A position to publish, as supplied by the caller
///
/// Optional fields fall back to the session configuration or to defaults
/// when the envelope is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInput {
    pub device_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub map_uuid: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl PositionInput {
    pub fn new(device_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            device_id: device_id.into(),
            lat,
            lon,
            namespace: None,
            map_uuid: None,
            user_name: None,
            model: None,
            color: None,
            device_info: None,
            data: Map::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_map_uuid(mut self, map_uuid: impl Into<String>) -> Self {
        self.map_uuid = Some(map_uuid.into());
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Canonical publish payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionEnvelope {
    pub app_namespace: String,
    pub device_info: DeviceInfo,
    pub data: Map<String, Value>,
    pub lat: f64,
    pub lon: f64,
    pub map_uuid: String,
    pub model: String,
    pub origin: u8,
    pub timestamp: String,
    pub user_name: String,
    pub user_uuid: String,
    pub color: String,
}

impl PositionEnvelope {
    /// Build the envelope for `input`, stamped with `now`
    ///
    /// # Errors
    /// `InvalidDeviceId` for identifiers that do not reduce to 12 hex
    /// characters, `Send` for out-of-range coordinates or a missing map.
    pub fn build(
        config: &SessionConfig,
        input: PositionInput,
        now: DateTime<Utc>,
    ) -> Result<Self, TrackingError> {
        let user_uuid = normalize_device_id(&input.device_id)?;

        if !input.lat.is_finite() || !(-90.0..=90.0).contains(&input.lat) {
            return Err(TrackingError::Send(format!("latitude out of range: {}", input.lat)));
        }
        if !input.lon.is_finite() || !(-180.0..=180.0).contains(&input.lon) {
            return Err(TrackingError::Send(format!("longitude out of range: {}", input.lon)));
        }

        let map_uuid = input
            .map_uuid
            .or_else(|| config.map_uuid.clone())
            .ok_or_else(|| TrackingError::Send("map_uuid is required".to_string()))?;

        Ok(Self {
            app_namespace: input.namespace.unwrap_or_else(|| config.namespace.clone()),
            device_info: input.device_info.unwrap_or_default(),
            data: input.data,
            lat: input.lat,
            lon: input.lon,
            map_uuid,
            model: input.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            origin: EXTERNAL_ORIGIN,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            user_name: input.user_name.unwrap_or_else(|| user_uuid.clone()),
            user_uuid,
            color: input.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        })
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of one publish; failures are values, never panics or errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// One failed item of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemError {
    pub device_id: String,
    pub error: String,
}

/// Outcome of a batch publish
///
/// `success` is true iff nothing failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<BatchItemError>>,
}

impl BatchResult {
    pub fn from_outcomes(sent: usize, errors: Vec<BatchItemError>) -> Self {
        let failed = errors.len();
        Self {
            success: failed == 0,
            sent,
            failed,
            errors: (!errors.is_empty()).then_some(errors),
        }
    }

    /// Every item failed with the same error
    pub fn all_failed(positions: &[PositionInput], error: impl std::fmt::Display) -> Self {
        let error = error.to_string();
        let errors = positions
            .iter()
            .map(|p| BatchItemError {
                device_id: p.device_id.clone(),
                error: error.clone(),
            })
            .collect();
        Self::from_outcomes(0, errors)
    }
}
