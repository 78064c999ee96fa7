use serde::{Deserialize, Serialize};

/// Connection-level options for the shared STOMP connection.
///
/// These options control:
/// - Automatic reconnection on connection loss
/// - Reconnection timing (linear backoff) and retry limits
/// - The STOMP virtual host sent in the `CONNECT` frame
///
/// # Example
///
/// ```rust
/// use inno_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection after an unclean disconnect.
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base delay in milliseconds between reconnection attempts.
    /// Attempt `n` waits `n * reconnect_delay_ms` (linear backoff).
    /// Default: 3000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Number of automatic reconnection attempts before giving up.
    /// Once exhausted the client stays `DISCONNECTED` until a manual
    /// `connect()`. Default: 5
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Value of the STOMP `host` header.
    /// Default: "/"
    #[serde(default = "default_virtual_host")]
    pub virtual_host: String,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_virtual_host() -> String {
    "/".to_string()
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            virtual_host: default_virtual_host(),
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the base delay between reconnection attempts (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the maximum number of automatic reconnection attempts
    pub fn with_max_reconnect_attempts(mut self, max_attempts: u32) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set the STOMP virtual host
    pub fn with_virtual_host(mut self, host: impl Into<String>) -> Self {
        self.virtual_host = host.into();
        self
    }
}
