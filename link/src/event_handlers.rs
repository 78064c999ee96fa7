//! Hooks into the STOMP session lifecycle.
//!
//! The connection task calls these as the session moves through its states.
//! A `CONNECTED` frame fires [`on_connect`](EventHandlers::on_connect), every
//! end of a session (server close, missed heart-beats, `ERROR` frame, or a
//! `DISCONNECT` receipt) fires [`on_disconnect`](EventHandlers::on_disconnect),
//! and failed attempts fire [`on_error`](EventHandlers::on_error) flagged with
//! whether a reconnect will follow. [`on_receive`](EventHandlers::on_receive)
//! and [`on_send`](EventHandlers::on_send) see raw frames for debugging.
//!
//! Hooks never run while the client holds a lock, so they may subscribe,
//! publish or drop handles.
//!
//! ```rust,no_run
//! use inno_link::{EventHandlers, LiveClient};
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| log::info!("dashboard live"))
//!     .on_disconnect(|reason| log::warn!("dashboard offline: {}", reason))
//!     .on_error(|e| {
//!         if !e.recoverable {
//!             log::error!("sign in again: {}", e);
//!         }
//!     });
//!
//! let client = LiveClient::builder()
//!     .url("http://localhost:8080/api/v1/ws")
//!     .event_handlers(handlers)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

use crate::models::ConnectionState;

/// Why a STOMP session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub message: String,
    /// WebSocket close code when the socket reported one: 1000 after a
    /// receipted `DISCONNECT`, 1006 for a dropped link.
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self { message: message.into(), code: Some(code) }
    }

    /// Whether the session was closed on purpose (receipted `DISCONNECT`).
    pub fn is_clean(&self) -> bool {
        self.code == Some(1000)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// A failed connect or reconnect attempt.
///
/// `recoverable` is false for a rejected credential (the broker answered
/// `CONNECT` with `ERROR`, or refused the upgrade); the client stops retrying
/// and sits in `ERROR` until `connect()` is called with a new token.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub message: String,
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self { message: message.into(), recoverable }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

type Hook<A> = Option<Arc<dyn Fn(A) + Send + Sync>>;
type FrameHook = Option<Arc<dyn Fn(&str) + Send + Sync>>;

/// Session callbacks, all optional. Cloning shares the callbacks.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<Arc<dyn Fn() + Send + Sync>>,
    pub(crate) on_disconnect: Hook<DisconnectReason>,
    pub(crate) on_error: Hook<ConnectionError>,
    pub(crate) on_state_change: Hook<ConnectionState>,
    pub(crate) on_receive: FrameHook,
    pub(crate) on_send: FrameHook,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on every `CONNECTED` frame, including after a reconnect. By the
    /// time it runs, registered destinations are being re-subscribed.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called once per change of [`ConnectionState`]; repeated writes of the
    /// same state are not reported. Backoff between reconnects reads as
    /// `Disconnected`.
    pub fn on_state_change(mut self, f: impl Fn(ConnectionState) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Every inbound STOMP frame as text, before routing. Heart-beats show
    /// up as `[heartbeat]`.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Every outbound STOMP frame as text. The `CONNECT` frame carries the
    /// bearer token; do not log it verbatim.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_state_change.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_state_change(&self, state: ConnectionState) {
        if let Some(cb) = &self.on_state_change {
            cb(state);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_unset_hooks_are_skipped() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        handlers.emit_connect();
        handlers.emit_disconnect(DisconnectReason::new("bye"));
        handlers.emit_error(ConnectionError::new("refused", true));
        handlers.emit_receive("CONNECTED\n\n\0");
    }

    #[test]
    fn test_hooks_see_session_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = {
            let (a, b, c) = (log.clone(), log.clone(), log.clone());
            EventHandlers::new()
                .on_state_change(move |s| a.lock().unwrap().push(format!("state {}", s)))
                .on_disconnect(move |r| b.lock().unwrap().push(format!("closed {}", r)))
                .on_error(move |e| c.lock().unwrap().push(format!("error {} {}", e, e.recoverable)))
        };
        assert!(handlers.has_any());

        handlers.emit_state_change(ConnectionState::Connected);
        handlers.emit_disconnect(DisconnectReason::with_code("Connection reset", 1006));
        handlers.emit_error(ConnectionError::new("Invalid token", false));

        let log = log.lock().unwrap();
        assert_eq!(log[1], "closed Connection reset (code: 1006)");
        assert_eq!(log[2], "error Invalid token false");
        assert!(log[0].starts_with("state "));
    }

    #[test]
    fn test_clean_close_is_receipted_disconnect() {
        assert!(DisconnectReason::with_code("Client disconnected", 1000).is_clean());
        assert!(!DisconnectReason::with_code("Connection reset", 1006).is_clean());
        assert!(!DisconnectReason::new("Heart-beat timeout").is_clean());
        assert_eq!(DisconnectReason::new("Server closed").to_string(), "Server closed");
    }
}
