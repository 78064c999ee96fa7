//! Reconnection policy.
//!
//! The connection task moves through
//! `Idle → Connecting → Connected → Backoff(attempt) → Failed`; each phase
//! maps to exactly one public [`ConnectionState`].

use std::time::Duration;

use crate::models::{ConnectionOptions, ConnectionState};

/// Phase of the background connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session and no retry pending.
    Idle,
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `n` (1-based).
    Backoff(u32),
    /// Terminal failure; only a manual connect leaves this phase.
    Failed,
}

impl Phase {
    pub fn state(&self) -> ConnectionState {
        match self {
            Phase::Idle | Phase::Backoff(_) => ConnectionState::Disconnected,
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Connected => ConnectionState::Connected,
            Phase::Failed => ConnectionState::Error,
        }
    }
}

/// Bounded linear backoff: attempt `n` waits `n * base_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempts: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectState {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay,
        }
    }

    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self::new(
            options.max_reconnect_attempts,
            Duration::from_millis(options.reconnect_delay_ms),
        )
    }

    /// Claim the next attempt and return its delay, or `None` once the
    /// bound is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.base_delay.saturating_mul(self.attempts))
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Called on every `CONNECTED`.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
