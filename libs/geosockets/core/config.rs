use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Default time allowed for the WebSocket handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a ConnectionManager
///
/// Built with the type-state [`ConnectionBuilder`](crate::builder::ConnectionBuilder)
/// and immutable afterwards.
pub struct ConnectionConfig {
    /// WebSocket URL (wss:// or ws://) without credentials
    pub(crate) url: String,

    /// Places credentials on the URL for every attempt
    pub(crate) auth: Arc<dyn AuthProvider>,

    /// Opens sockets; chosen once at construction time
    pub(crate) factory: Arc<dyn SocketFactory>,

    /// Reconnection delays and attempt budget
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Upper bound for one handshake
    pub(crate) connect_timeout: Duration,

    /// Log full frame payloads instead of sizes only
    pub(crate) debug: bool,
}

impl ConnectionConfig {
    /// Get a reference to the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn reconnect_strategy(&self) -> &dyn ReconnectionStrategy {
        self.reconnect_strategy.as_ref()
    }
}
