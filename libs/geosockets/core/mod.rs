//! Connection core: state machine, manager, builder and dispatcher
//!
//! ## Example
//!
//! ```rust,ignore
//! use geosockets::*;
//! use std::sync::Arc;
//!
//! let manager = ConnectionManager::builder()
//!     .url("wss://stream.example.com/v1/subscribe")
//!     .auth(QueryCredentials::new(Some(api_key), None))
//!     .handler(Arc::new(NoOpHandler))
//!     .build();
//!
//! manager.connect().await?;
//! manager.send_json(&serde_json::json!({ "type": "SUBSCRIBE" }))?;
//! manager.disconnect().await;
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod dispatcher;
pub mod tungstenite;

// Re-export main types
pub use builder::{states, ConnectionBuilder};
pub use config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT};
pub use connection::{ConnectionManager, Metrics, CLOSE_GRACE_PERIOD};
pub use connection_state::{AtomicMetrics, ConnectionState};
pub use dispatcher::{Event, EventDispatcher, Handler, ListenerId, Unsubscribe};
pub use tungstenite::TungsteniteFactory;
