//! Publisher channel

pub mod publisher_ws;
pub mod types;

pub use publisher_ws::PublisherSession;
pub use types::{
    normalize_device_id, BatchItemError, BatchResult, DeviceInfo, PositionEnvelope,
    PositionInput, PublishResult, DEFAULT_COLOR, EXTERNAL_ORIGIN,
};
