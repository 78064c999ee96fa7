//! Inbound message routing.
//!
//! A `MESSAGE` frame is matched to its destination by exact string, decoded
//! once, and handed to each handler in turn. A handler that panics is logged
//! and skipped; the remaining handlers and later frames are unaffected.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::LinkError;
use crate::models::{Destinations, InboundMessage};
use crate::registry::{now_ms, MessageHandler, SubscriptionRegistry};
use crate::stomp::Frame;

/// Route one `MESSAGE` frame. Returns the number of handlers that completed.
pub(crate) fn dispatch(
    registry: &SubscriptionRegistry,
    destinations: &Destinations,
    frame: &Frame,
) -> usize {
    let Some(destination) = frame.destination() else {
        log::warn!("[inno-link] Dropping MESSAGE without destination header");
        return 0;
    };

    let handlers = registry.handlers_for(destination);
    if handlers.is_empty() {
        // Unsubscribed while the frame was in flight.
        log::debug!("[inno-link] No handlers for {}; frame dropped", destination);
        return 0;
    }

    let received_at = now_ms();
    let message = match InboundMessage::decode(destinations, destination, &frame.body, received_at) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("[inno-link] Dropping frame on {}: {}", destination, e);
            return 0;
        },
    };

    registry.record_delivery(destination, received_at);
    deliver(&message, &handlers)
}

/// Invoke each handler with `message`, isolating panics.
pub(crate) fn deliver(message: &InboundMessage, handlers: &[MessageHandler]) -> usize {
    let mut completed = 0;
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(()) => completed += 1,
            Err(panic) => {
                let err = LinkError::HandlerFailure(panic_message(panic.as_ref()));
                log::warn!("[inno-link] Handler on {} failed: {}", message.destination, err);
            },
        }
    }
    completed
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
