use std::time::Duration;
use thiserror::Error;

/// Main error type for geosockets
///
/// Errors are `Clone` so that a single in-flight connection attempt can hand
/// the same outcome to every caller awaiting it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// Socket could not be created or the handshake failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Handshake did not complete within the connection timeout
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Server refused the credentials (reserved close code or HTTP status)
    #[error("Authentication failed (code {code}): {reason}")]
    Authentication { code: u16, reason: String },

    /// Server rejected the upgrade request with a non-101 HTTP status
    #[error("Handshake rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Operation requires an open socket
    #[error("Not connected")]
    NotConnected,

    /// WebSocket protocol or IO error on an open socket
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Message parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    /// Reconnection budget exhausted
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectionFailed { attempts: usize },

    /// Attempt abandoned because disconnect() ran while it was in flight
    #[error("Connection attempt cancelled by disconnect")]
    Cancelled,
}

impl SocketError {
    /// True for failures caused by rejected credentials
    pub fn is_authentication(&self) -> bool {
        matches!(self, SocketError::Authentication { .. })
    }

    /// True for failures that must never be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SocketError::Authentication { .. } | SocketError::ReconnectionFailed { .. }
        )
    }
}

/// Result type for geosockets operations
pub type Result<T> = std::result::Result<T, SocketError>;
