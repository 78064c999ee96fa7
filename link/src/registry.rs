//! Subscription registry.
//!
//! Maps each destination to the handlers listening on it. A destination has an
//! entry exactly while it has at least one handler; the first handler opens
//! the wire subscription and removing the last one closes it.
//!
//! Callers never see entries directly. They hold a [`SubscriptionHandle`],
//! which removes exactly one handler when unsubscribed or dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::client::ClientInner;
use crate::models::{InboundMessage, SubscriptionInfo};

/// Callback invoked for each decoded message on a destination.
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

pub(crate) type HandlerId = u64;

/// Current time in millis since Unix epoch.
#[inline]
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct DestinationEntry {
    sub_id: String,
    handlers: Vec<(HandlerId, MessageHandler)>,
    created_at_ms: u64,
    last_message_ms: Option<u64>,
    delivered: u64,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, DestinationEntry>,
    next_handler_id: HandlerId,
    next_sub_seq: u64,
}

/// Outcome of adding a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Attach {
    /// The destination was already bound; no wire traffic needed.
    Joined { handler_id: HandlerId },
    /// First handler; the caller must issue a wire `SUBSCRIBE`.
    Opened { handler_id: HandlerId, sub_id: String },
    /// A new binding was needed but not allowed.
    Refused,
}

/// Outcome of removing a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Detach {
    NotFound,
    Remaining(usize),
    /// Last handler gone; the caller must issue a wire `UNSUBSCRIBE`.
    Closed { sub_id: String },
}

/// Destination → handlers map shared by the client and its connection task.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Handlers never run under this lock, so poisoning only means a panic
    // elsewhere; the map itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `handler` to `destination`. A new entry is created only when
    /// `allow_new` is set.
    pub fn attach(&self, destination: &str, handler: MessageHandler, allow_new: bool) -> Attach {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let handler_id = inner.next_handler_id;

        if let Some(entry) = inner.entries.get_mut(destination) {
            entry.handlers.push((handler_id, handler));
            inner.next_handler_id += 1;
            return Attach::Joined { handler_id };
        }

        if !allow_new {
            return Attach::Refused;
        }

        let sub_id = format!("sub-{}", inner.next_sub_seq);
        inner.next_sub_seq += 1;
        inner.next_handler_id += 1;
        inner.entries.insert(
            destination.to_string(),
            DestinationEntry {
                sub_id: sub_id.clone(),
                handlers: vec![(handler_id, handler)],
                created_at_ms: now_ms(),
                last_message_ms: None,
                delivered: 0,
            },
        );
        Attach::Opened { handler_id, sub_id }
    }

    pub fn remove_handler(&self, destination: &str, handler_id: HandlerId) -> Detach {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(destination) else {
            return Detach::NotFound;
        };
        let before = entry.handlers.len();
        entry.handlers.retain(|(id, _)| *id != handler_id);
        if entry.handlers.len() == before {
            return Detach::NotFound;
        }
        if !entry.handlers.is_empty() {
            return Detach::Remaining(entry.handlers.len());
        }
        match inner.entries.remove(destination) {
            Some(entry) => Detach::Closed { sub_id: entry.sub_id },
            None => Detach::NotFound,
        }
    }

    pub fn has_handler(&self, destination: &str, handler_id: HandlerId) -> bool {
        self.lock()
            .entries
            .get(destination)
            .map_or(false, |e| e.handlers.iter().any(|(id, _)| *id == handler_id))
    }

    /// Handlers for `destination`, cloned so they can run without the lock.
    pub fn handlers_for(&self, destination: &str) -> Vec<MessageHandler> {
        self.lock()
            .entries
            .get(destination)
            .map(|e| e.handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub fn record_delivery(&self, destination: &str, at_ms: u64) {
        if let Some(entry) = self.lock().entries.get_mut(destination) {
            entry.delivered += 1;
            entry.last_message_ms = Some(at_ms);
        }
    }

    /// `(destination, sub_id)` for every live entry.
    pub fn snapshot_wire(&self) -> Vec<(String, String)> {
        self.lock()
            .entries
            .iter()
            .map(|(dest, e)| (dest.clone(), e.sub_id.clone()))
            .collect()
    }

    /// Remove every entry, returning what was wired.
    pub fn drain(&self) -> Vec<(String, String)> {
        self.lock()
            .entries
            .drain()
            .map(|(dest, e)| (dest, e.sub_id))
            .collect()
    }

    pub fn infos(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<_> = self
            .lock()
            .entries
            .iter()
            .map(|(dest, e)| SubscriptionInfo {
                destination: dest.clone(),
                subscription_id: e.sub_id.clone(),
                handler_count: e.handlers.len(),
                created_at_ms: e.created_at_ms,
                last_message_time_ms: e.last_message_ms,
                delivered: e.delivered,
            })
            .collect();
        infos.sort_by(|a, b| a.destination.cmp(&b.destination));
        infos
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

/// Capability to remove one handler from one destination.
///
/// `unsubscribe` is idempotent and dropping the handle unsubscribes. A handle
/// returned for a refused subscribe is inert: it was never active and
/// unsubscribing it does nothing.
#[must_use = "dropping a SubscriptionHandle unsubscribes immediately"]
pub struct SubscriptionHandle {
    client: Weak<ClientInner>,
    destination: String,
    handler_id: Option<HandlerId>,
    released: AtomicBool,
}

impl SubscriptionHandle {
    pub(crate) fn active(client: Weak<ClientInner>, destination: String, handler_id: HandlerId) -> Self {
        Self {
            client,
            destination,
            handler_id: Some(handler_id),
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn inert(destination: String) -> Self {
        Self {
            client: Weak::new(),
            destination,
            handler_id: None,
            released: AtomicBool::new(true),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        if self.released.load(Ordering::Acquire) {
            return false;
        }
        match (self.handler_id, self.client.upgrade()) {
            (Some(id), Some(client)) => client.registry().has_handler(&self.destination, id),
            _ => false,
        }
    }

    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let (Some(id), Some(client)) = (self.handler_id, self.client.upgrade()) {
            client.release_handler(&self.destination, id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("destination", &self.destination)
            .field("handler_id", &self.handler_id)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}
