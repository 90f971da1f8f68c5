//! # Geosockets Traits
//!
//! Core traits and types used throughout geosockets:
//!
//! - **SocketFactory**: Open sockets (real or in-memory)
//! - **AuthProvider**: Attach credentials to the connection URL
//! - **ReconnectionStrategy**: Control reconnection delays and budget
//! - **SessionHandler**: Interpret payloads and observe lifecycle changes
//!
//! ## Example
//!
//! ```rust,ignore
//! use geosockets::traits::*;
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl SessionHandler for Printer {
//!     fn handle_message(&self, message: serde_json::Value) -> Result<()> {
//!         println!("{message}");
//!         Ok(())
//!     }
//!
//!     fn handle_lifecycle(&self, event: LifecycleEvent) {
//!         println!("{event:?}");
//!     }
//! }
//! ```

pub mod auth;
pub mod error;
pub mod handler;
pub mod reconnect;
pub mod socket;

// Re-export commonly used types
pub use auth::{AuthProvider, NoAuth, QueryCredentials};
pub use error::{Result, SocketError};
pub use handler::{LifecycleEvent, NoOpHandler, SessionHandler};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
pub use socket::{close_code, CloseFrame, SocketFactory, SocketPair, SocketSink, SocketStream, WsMessage};
