use crate::error::{Result, SocketError};
use async_trait::async_trait;
use futures::{Sink, Stream};
use std::pin::Pin;

/// Close codes with special meaning to the connection manager
pub mod close_code {
    /// Normal closure: never triggers reconnection
    pub const NORMAL: u16 = 1000;
    /// No close frame was received (stream ended or transport error)
    pub const ABNORMAL: u16 = 1006;
    /// HTTP-style unauthorized, surfaced by a rejected handshake
    pub const UNAUTHORIZED: u16 = 401;
    /// HTTP-style forbidden, surfaced by a rejected handshake
    pub const FORBIDDEN: u16 = 403;
    /// Application close code: invalid or missing credentials
    pub const AUTH_INVALID: u16 = 4001;
    /// Application close code: credentials lack access to the namespace
    pub const AUTH_FORBIDDEN: u16 = 4003;

    /// Codes that mean "stop, your credentials are bad"
    pub const AUTH_FAILURES: [u16; 4] = [UNAUTHORIZED, FORBIDDEN, AUTH_INVALID, AUTH_FORBIDDEN];

    pub fn is_auth_failure(code: u16) -> bool {
        AUTH_FAILURES.contains(&code)
    }
}

/// Close frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(close_code::NORMAL, "client disconnect")
    }
}

/// WebSocket frame as seen by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, WsMessage::Close(_))
    }

    /// Payload length in bytes (0 for close frames)
    pub fn len(&self) -> usize {
        match self {
            WsMessage::Text(s) => s.len(),
            WsMessage::Binary(b) => b.len(),
            WsMessage::Close(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize a JSON value into a text frame
    pub fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_string(value)
            .map(WsMessage::Text)
            .map_err(|e| SocketError::Parse(e.to_string()))
    }
}

/// Write half of an open socket
pub type SocketSink = Pin<Box<dyn Sink<WsMessage, Error = SocketError> + Send>>;

/// Read half of an open socket
pub type SocketStream = Pin<Box<dyn Stream<Item = Result<WsMessage>> + Send>>;

/// Both halves of an open socket, returned once the handshake completed
pub struct SocketPair {
    pub sink: SocketSink,
    pub stream: SocketStream,
}

impl SocketPair {
    pub fn new(sink: SocketSink, stream: SocketStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens sockets for a connection manager
///
/// Selected once at construction time. Production code uses
/// `TungsteniteFactory`; tests inject in-memory implementations.
///
/// # Errors
/// Implementations report a handshake refused with an HTTP status as
/// `SocketError::Rejected` so that 401/403 can be treated as authentication
/// failures.
#[async_trait]
pub trait SocketFactory: Send + Sync + 'static {
    /// Open a socket to `url` and complete the WebSocket handshake
    async fn open(&self, url: &str) -> Result<SocketPair>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_codes() {
        for code in [401, 403, 4001, 4003] {
            assert!(close_code::is_auth_failure(code), "{code}");
        }
        for code in [1000, 1001, 1006, 1011, 4000, 4002] {
            assert!(!close_code::is_auth_failure(code), "{code}");
        }
    }

    #[test]
    fn test_json_frame() {
        let frame = WsMessage::json(&serde_json::json!({"type": "SUBSCRIBE"})).unwrap();
        assert_eq!(frame.as_text(), Some(r#"{"type":"SUBSCRIBE"}"#));
        assert!(!frame.is_close());
        assert!(WsMessage::Close(None).is_empty());
    }
}
