//! Connection State Types
//!
//! The lifecycle states of the single feed connection and the transition
//! table the session enforces.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Reconnecting ──► Connected
//!      ▲               │              │              │
//!      │               ▼              │              ▼
//!      │         Reconnecting/Failed  │            Failed ──(manual retry)──► Connecting
//!      └──────────── disconnect() ◄───┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket, no pending reconnect.
    #[default]
    Disconnected,
    /// First open attempt in flight.
    Connecting,
    /// Socket open, directives flowing.
    Connected,
    /// Connection lost, automatic recovery in progress.
    Reconnecting,
    /// Recovery budget exhausted; only a manual retry leaves this state.
    Failed,
}

impl ConnectionState {
    /// Get all states.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Disconnected,
            Self::Connecting,
            Self::Connected,
            Self::Reconnecting,
            Self::Failed,
        ]
    }

    /// Check whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Failed, Self::Connecting)
                | (
                    Self::Connecting,
                    Self::Connected | Self::Reconnecting | Self::Failed
                )
                | (Self::Connected, Self::Reconnecting)
                | (Self::Reconnecting, Self::Connected | Self::Failed)
                | (
                    Self::Connecting | Self::Connected | Self::Reconnecting | Self::Failed,
                    Self::Disconnected
                )
        )
    }

    /// Validate and perform a transition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `next` is not reachable from `self`.
    pub const fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Whether the socket is open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    /// Numeric code used for the connection state gauge.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::Failed => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection state transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// State the machine was in.
    pub from: ConnectionState,
    /// Requested state.
    pub to: ConnectionState,
}

// =============================================================================
// Feed Status
// =============================================================================

/// Observable connection status exposed to consumers.
///
/// Every error condition of the session resolves to a field here; nothing
/// is thrown across the consumer boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Current connection state.
    pub state: ConnectionState,
    /// Last transport or server-reported error, cleared on connect.
    pub last_error: Option<String>,
    /// Reconnection attempts made since the last successful connection.
    pub reconnect_attempt: u32,
    /// When the connection last reached `Connected`.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Symbols the server has acknowledged on this connection.
    pub acknowledged_symbols: usize,
}

impl FeedStatus {
    /// Whether consumers should treat the data as live.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.state.is_connected()
    }

    /// Whether the session is recovering from a lost connection.
    #[must_use]
    pub const fn is_reconnecting(&self) -> bool {
        matches!(self.state, ConnectionState::Reconnecting)
    }
}

// =============================================================================
// Tests
// =============================================================================
