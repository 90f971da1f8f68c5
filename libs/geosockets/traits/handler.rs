use crate::error::{Result, SocketError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Connection lifecycle notifications raised by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Socket opened and the session is usable
    Connected,
    /// Socket closed (any code other than an authentication failure)
    Disconnected { code: u16, reason: String },
    /// A reconnection attempt has been scheduled
    Reconnecting { attempt: usize, delay: Duration },
    /// Transport, authentication or reconnection-budget failure
    Error(SocketError),
}

/// Trait injected into a connection manager to interpret its traffic
///
/// The manager owns the socket and the state machine; everything that
/// depends on what the payloads mean lives behind this trait.
///
/// All methods are invoked from the socket task in arrival order. They must
/// not block: long work belongs in a spawned task.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Handle one inbound payload
    ///
    /// Text frames are parsed as JSON; anything that fails to parse is
    /// passed through as `Value::String` holding the raw text.
    ///
    /// # Errors
    /// Returned errors are logged by the manager and never close the socket.
    fn handle_message(&self, message: Value) -> Result<()>;

    /// Observe a lifecycle transition
    fn handle_lifecycle(&self, event: LifecycleEvent);

    /// Runs after a reconnection attempt succeeded
    ///
    /// Failures must be reported by the implementation itself (for example
    /// through its own error event); nothing here can abort the
    /// reconnection flow.
    async fn handle_reconnected(&self) {}
}

/// A handler that ignores everything
pub struct NoOpHandler;

#[async_trait]
impl SessionHandler for NoOpHandler {
    fn handle_message(&self, _message: Value) -> Result<()> {
        Ok(())
    }

    fn handle_lifecycle(&self, _event: LifecycleEvent) {}
}
