//! # Geosockets
//!
//! WebSocket transport for the realtime tracking sessions.
//!
//! ## Features
//!
//! - **Explicit state machine**: every transition validated, illegal ones rejected
//! - **Type-state builder**: URL and session handler required at compile time
//! - **Composable**: payload handling injected through [`SessionHandler`]
//! - **Injectable sockets**: [`SocketFactory`] swaps tungstenite for in-memory sockets
//! - **Typed events**: [`EventDispatcher`] routes a tagged union by its name

pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    builder, config, connection, connection_state, dispatcher, tungstenite,
    builder::{states, ConnectionBuilder},
    config::ConnectionConfig,
    connection::{ConnectionManager, Metrics, CLOSE_GRACE_PERIOD},
    connection_state::{AtomicMetrics, ConnectionState},
    dispatcher::{Event, EventDispatcher, Handler, ListenerId, Unsubscribe},
    tungstenite::TungsteniteFactory,
};
