//! Timeout configuration for live client operations.
//!
//! Provides centralized timeout management for the socket connect, the STOMP
//! handshake, the disconnect receipt and the heart-beat exchange.

use std::time::Duration;

/// Timeout configuration for live client operations.
///
/// # Examples
///
/// ```rust
/// use inno_link::LinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = LinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = LinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .handshake_timeout(Duration::from_secs(15))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = LinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTimeouts {
    /// Timeout for opening the socket (TCP + TLS + WebSocket upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for the STOMP handshake (`CONNECT` → `CONNECTED`).
    /// Default: 5 seconds
    pub handshake_timeout: Duration,

    /// Maximum wait for the server's `RECEIPT` to a `DISCONNECT`.
    /// Default: 2 seconds
    pub disconnect_timeout: Duration,

    /// Heart-beat interval the client offers to send (`cx`).
    /// Set to 0 to never send heart-beats.
    /// Default: 10 seconds
    pub heartbeat_outgoing: Duration,

    /// Heart-beat interval the client wants to receive (`cy`).
    /// Set to 0 to never expect heart-beats.
    /// Default: 10 seconds
    pub heartbeat_incoming: Duration,

    /// Extra time allowed past the negotiated incoming interval before the
    /// connection is considered dead.
    /// Default: 5 seconds
    pub heartbeat_grace: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(2),
            heartbeat_outgoing: Duration::from_secs(10),
            heartbeat_incoming: Duration::from_secs(10),
            heartbeat_grace: Duration::from_secs(5),
        }
    }
}

impl LinkTimeouts {
    /// Create a builder for custom timeout configuration.
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Create timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            disconnect_timeout: Duration::from_secs(1),
            heartbeat_outgoing: Duration::from_secs(5),
            heartbeat_incoming: Duration::from_secs(5),
            heartbeat_grace: Duration::from_secs(2),
        }
    }

    /// Create timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(15),
            disconnect_timeout: Duration::from_secs(5),
            heartbeat_outgoing: Duration::from_secs(20),
            heartbeat_incoming: Duration::from_secs(20),
            heartbeat_grace: Duration::from_secs(10),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }
}

/// Builder for creating custom [`LinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake_timeout = timeout;
        self
    }

    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.disconnect_timeout = timeout;
        self
    }

    /// Set both heart-beat intervals at once.
    /// Set to 0 to disable heart-beats.
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_outgoing = interval;
        self.timeouts.heartbeat_incoming = interval;
        self
    }

    pub fn heartbeat_outgoing(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_outgoing = interval;
        self
    }

    pub fn heartbeat_incoming(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_incoming = interval;
        self
    }

    pub fn heartbeat_grace(mut self, grace: Duration) -> Self {
        self.timeouts.heartbeat_grace = grace;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}
