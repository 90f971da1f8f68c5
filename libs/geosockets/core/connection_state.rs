//! Connection state machine and lock-free counters
//!
//! Every state change of a connection goes through
//! [`ConnectionState::transition`], which rejects moves that are not in the
//! table below:
//!
//! ```text
//! Disconnected ──> Connecting ──> Connected ──> Closing ──> Disconnected
//!      │  ▲            │              │
//!      │  └────────────┘ (failure)    └──> Disconnected (socket closed)
//!      ▼
//! Reconnecting ──> Connecting
//!      └─────────> Disconnected (disconnect() during backoff)
//! ```

use crate::error::{Result, SocketError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Reconnecting,
}

impl ConnectionState {
    /// Whether the table allows moving from `self` to `next`
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Disconnected, Reconnecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Closing)
                | (Connected, Disconnected)
                | (Closing, Disconnected)
                | (Reconnecting, Connecting)
                | (Reconnecting, Disconnected)
        )
    }

    /// Move to `next` or fail with `InvalidState`
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(SocketError::InvalidState(format!("{self} -> {next}")));
        }
        *self = next;
        Ok(())
    }

    #[inline]
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Reconnecting => "RECONNECTING",
        };
        f.write_str(name)
    }
}

/// Traffic counters shared between the manager and its socket task
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    const ALL: [ConnectionState; 5] = [Disconnected, Connecting, Connected, Closing, Reconnecting];

    #[test]
    fn test_happy_path() {
        let mut state = Disconnected;
        for next in [Connecting, Connected, Closing, Disconnected] {
            state.transition(next).unwrap();
        }
        assert_eq!(state, Disconnected);
    }

    #[test]
    fn test_reconnect_cycle() {
        let mut state = Connected;
        state.transition(Disconnected).unwrap();
        state.transition(Reconnecting).unwrap();
        state.transition(Connecting).unwrap();
        state.transition(Disconnected).unwrap();
        state.transition(Reconnecting).unwrap();
        state.transition(Disconnected).unwrap();
    }

    #[test]
    fn test_illegal_transitions_leave_state_untouched() {
        let mut state = Connected;
        let err = state.transition(Connecting).unwrap_err();
        assert!(matches!(err, SocketError::InvalidState(ref msg) if msg == "CONNECTED -> CONNECTING"));
        assert_eq!(state, Connected);

        let mut closing = Closing;
        assert!(closing.transition(Connected).is_err());
        assert_eq!(closing, Closing);
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{state}");
        }
    }

    #[test]
    fn test_disconnected_reachable_from_every_other_state() {
        for state in ALL.into_iter().filter(|s| *s != Disconnected) {
            assert!(state.can_transition_to(Disconnected), "{state}");
        }
    }

    #[test]
    fn test_metrics_counters() {
        let metrics = AtomicMetrics::new();
        metrics.increment_sent();
        metrics.increment_sent();
        metrics.increment_received();
        metrics.increment_reconnects();
        assert_eq!(metrics.messages_sent(), 2);
        assert_eq!(metrics.messages_received(), 1);
        assert_eq!(metrics.reconnect_count(), 1);
    }
}
