//! Connection management.
//!
//! This module contains:
//! - [`reconnect`]: Explicit phase machine and bounded linear backoff
//! - [`shared`]: The background task owning the single STOMP session

pub mod reconnect;
pub mod shared;

pub use reconnect::{Phase, ReconnectState};
pub(crate) use shared::{spawn_connection, ConnCmd, ConnectionParams, ConnectionTask};

use tokio::sync::watch;

use crate::event_handlers::EventHandlers;
use crate::models::ConnectionState;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);

/// Single authoritative [`ConnectionState`] for one client.
///
/// Every transition is published on a watch channel and forwarded to the
/// `on_state_change` hook. Setting the current value again is a no-op.
pub(crate) struct StateTracker {
    tx: watch::Sender<ConnectionState>,
    event_handlers: EventHandlers,
}

impl StateTracker {
    pub fn new(event_handlers: EventHandlers) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::NotInitialized);
        Self { tx, event_handlers }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn set(&self, state: ConnectionState) {
        if self.set_silently(state) {
            self.announce(state);
        }
    }

    /// Publish `state` to watchers without running the `on_state_change`
    /// hook. Returns whether the state changed. Used while a client lock is
    /// held; the caller runs [`announce`](Self::announce) after releasing it.
    pub(crate) fn set_silently(&self, state: ConnectionState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            log::debug!("[inno-link] Connection state -> {}", state);
        }
        changed
    }

    pub(crate) fn announce(&self, state: ConnectionState) {
        self.event_handlers.emit_state_change(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}
