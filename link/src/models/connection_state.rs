use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a [`LiveClient`](crate::LiveClient).
///
/// Exactly one state is active at a time; every transition is broadcast to
/// observers through [`LiveClient::state_changes`](crate::LiveClient::state_changes)
/// and the `on_state_change` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No connect attempt has been made yet.
    NotInitialized,
    /// A connect or reconnect attempt is in flight.
    Connecting,
    /// The server acknowledged the session (`CONNECTED` frame received).
    Connected,
    /// The session ended, cleanly or not. A reconnect may be pending.
    Disconnected,
    /// A connect attempt failed terminally; no automatic retry.
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotInitialized => "NOT_INITIALIZED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Error => "ERROR",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::NotInitialized
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
