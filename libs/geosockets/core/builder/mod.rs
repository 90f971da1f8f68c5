pub mod states;

use crate::config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT};
use crate::connection::ConnectionManager;
use crate::traits::*;
use crate::core::tungstenite::TungsteniteFactory;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for ConnectionManager
///
/// The URL and the session handler are required; `build()` is only
/// available once both are set. Everything else has a default:
///
/// | Option               | Default                                |
/// |----------------------|----------------------------------------|
/// | `auth`               | [`NoAuth`]                             |
/// | `factory`            | [`TungsteniteFactory`]                 |
/// | `reconnect_strategy` | exponential, 1s base, 30s cap, 10 tries |
/// | `connect_timeout`    | 10s                                    |
/// | `debug`              | off                                    |
pub struct ConnectionBuilder<U, H>
where
    U: UrlState,
    H: HandlerState,
{
    _state: TypeState<U, H>,
    url: Option<String>,
    handler: Option<Arc<dyn SessionHandler>>,
    auth: Option<Arc<dyn AuthProvider>>,
    factory: Option<Arc<dyn SocketFactory>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    connect_timeout: Duration,
    debug: bool,
}

impl ConnectionBuilder<NoUrl, NoHandler> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            url: None,
            handler: None,
            auth: None,
            factory: None,
            reconnect_strategy: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            debug: false,
        }
    }
}

impl Default for ConnectionBuilder<NoUrl, NoHandler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U, H> ConnectionBuilder<U, H>
where
    U: UrlState,
    H: HandlerState,
{
    fn retype<U2: UrlState, H2: HandlerState>(self) -> ConnectionBuilder<U2, H2> {
        ConnectionBuilder {
            _state: TypeState::new(),
            url: self.url,
            handler: self.handler,
            auth: self.auth,
            factory: self.factory,
            reconnect_strategy: self.reconnect_strategy,
            connect_timeout: self.connect_timeout,
            debug: self.debug,
        }
    }

    pub fn auth(mut self, auth: impl AuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Use a custom socket factory (in-memory sockets in tests)
    pub fn factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Log full frame payloads at debug level
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }
}

// URL setting
impl<H: HandlerState> ConnectionBuilder<NoUrl, H> {
    pub fn url(mut self, url: impl Into<String>) -> ConnectionBuilder<HasUrl, H> {
        self.url = Some(url.into());
        self.retype()
    }
}

// Handler setting
impl<U: UrlState> ConnectionBuilder<U, NoHandler> {
    pub fn handler(mut self, handler: Arc<dyn SessionHandler>) -> ConnectionBuilder<U, HasHandler> {
        self.handler = Some(handler);
        self.retype()
    }
}

// Build method - only available when all required fields are set
impl ConnectionBuilder<HasUrl, HasHandler> {
    /// Assemble the manager; no socket is opened until `connect()`
    ///
    /// The URL is parsed on every connection attempt, so a malformed URL
    /// surfaces as a `Configuration` error from `connect()`.
    pub fn build(self) -> ConnectionManager {
        let reconnect_strategy = self.reconnect_strategy.unwrap_or_else(|| {
            Box::new(ExponentialBackoff::new(
                Duration::from_secs(1),
                Duration::from_secs(30),
                Some(10),
            ))
        });

        let config = ConnectionConfig {
            url: self.url.unwrap_or_default(),
            auth: self.auth.unwrap_or_else(|| Arc::new(NoAuth)),
            factory: self.factory.unwrap_or_else(|| Arc::new(TungsteniteFactory)),
            reconnect_strategy,
            connect_timeout: self.connect_timeout,
            debug: self.debug,
        };

        let handler = self.handler.unwrap_or_else(|| Arc::new(NoOpHandler));
        ConnectionManager::from_parts(config, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_state::ConnectionState;

    #[test]
    fn test_defaults() {
        let manager = ConnectionBuilder::new()
            .url("wss://example.test/stream")
            .handler(Arc::new(NoOpHandler))
            .build();

        let config = manager.config();
        assert_eq!(config.url(), "wss://example.test/stream");
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert!(!config.debug());
        assert!(config.reconnect_strategy().should_reconnect(9));
        assert!(!config.reconnect_strategy().should_reconnect(10));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_setters_in_any_order() {
        let manager = ConnectionBuilder::new()
            .handler(Arc::new(NoOpHandler))
            .debug(true)
            .connect_timeout(Duration::from_millis(250))
            .reconnect_strategy(FixedDelay::new(Duration::from_millis(5), None))
            .url("ws://127.0.0.1:9")
            .build();

        assert!(manager.config().debug());
        assert_eq!(manager.config().connect_timeout(), Duration::from_millis(250));
        assert!(manager.config().reconnect_strategy().should_reconnect(1_000));
    }
}
