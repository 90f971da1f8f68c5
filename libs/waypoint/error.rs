use crate::config::ConfigError;
use geosockets::SocketError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by tracking sessions
///
/// Transport failures (connection, timeout, authentication) arrive wrapped
/// from the connection manager. Publish operations never return these
/// directly: they are folded into `PublishResult` / `BatchResult`.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error(transparent)]
    Transport(#[from] SocketError),

    /// Invalid subscription type or rejected request
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// No confirmation arrived in time; the connection stays up
    #[error("Subscription not confirmed within {0:?}")]
    SubscriptionTimeout(Duration),

    /// A newer subscribe() call replaced this one before it was confirmed
    #[error("Subscription superseded by a newer request")]
    Superseded,

    #[error("Send error: {0}")]
    Send(String),

    #[error("Invalid device identifier: {0:?}")]
    InvalidDeviceId(String),

    #[error("Publisher not configured (no map_uuid)")]
    PublisherNotConfigured,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TrackingError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, TrackingError::Transport(e) if e.is_authentication())
    }

    /// Connection or confirmation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TrackingError::Transport(SocketError::Timeout(_)) | TrackingError::SubscriptionTimeout(_)
        )
    }

    /// Failures of the subscribe handshake
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            TrackingError::Subscription(_)
                | TrackingError::SubscriptionTimeout(_)
                | TrackingError::Superseded
        )
    }
}

pub type Result<T> = std::result::Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let auth: TrackingError = SocketError::Authentication {
            code: 4001,
            reason: "bad key".into(),
        }
        .into();
        assert!(auth.is_authentication());
        assert!(!auth.is_timeout());

        let timeout = TrackingError::SubscriptionTimeout(Duration::from_secs(10));
        assert!(timeout.is_timeout());
        assert!(timeout.is_subscription());

        assert!(TrackingError::from(SocketError::Timeout(Duration::from_secs(1))).is_timeout());
        assert!(!TrackingError::PublisherNotConfigured.is_subscription());
    }

    #[test]
    fn test_transport_message_is_transparent() {
        let err = TrackingError::from(SocketError::NotConnected);
        assert_eq!(err.to_string(), "Not connected");
    }
}
