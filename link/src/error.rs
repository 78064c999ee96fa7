//! Error types for inno-link.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors produced by the real-time client.
///
/// Terminal errors ([`LinkError::AuthMissing`], [`LinkError::HandshakeFailure`])
/// are returned from [`LiveClient::connect`](crate::LiveClient::connect) and
/// never trigger an automatic reconnect. Everything else is either transient
/// (handled by the reconnect policy) or local to a single frame / handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// No credential was supplied when connecting.
    #[error("Authentication required: no credential supplied")]
    AuthMissing,

    /// The server refused the session (bad credential, policy denial).
    #[error("Handshake rejected: {0}")]
    HandshakeFailure(String),

    /// Network-level failure (refused socket, dropped connection).
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Operation attempted while the client is not connected.
    #[error("Not connected")]
    NotConnected,

    /// Inbound payload did not match the expected message shape.
    #[error("Failed to decode message: {0}")]
    DecodeFailure(String),

    /// A registered handler panicked.
    #[error("Handler failed: {0}")]
    HandlerFailure(String),

    /// Connect, handshake or receipt wait timed out.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Invalid configuration (bad URL, unreadable config file).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Outbound body could not be serialized.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LinkError {
    /// Whether this error should stop any automatic retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkError::AuthMissing | LinkError::HandshakeFailure(_))
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        LinkError::ConfigurationError(format!("Invalid TOML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(LinkError::AuthMissing.is_terminal());
        assert!(LinkError::HandshakeFailure("bad token".into()).is_terminal());
        assert!(!LinkError::TransportFailure("reset".into()).is_terminal());
        assert!(!LinkError::TimeoutError("connect".into()).is_terminal());
        assert!(!LinkError::NotConnected.is_terminal());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            LinkError::HandshakeFailure("Invalid token".into()).to_string(),
            "Handshake rejected: Invalid token"
        );
        assert_eq!(LinkError::NotConnected.to_string(), "Not connected");
    }
}
