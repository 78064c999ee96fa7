//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] provides a read-only snapshot of an active
//! destination binding, for dashboards and debugging.

use serde::{Deserialize, Serialize};

/// Read-only snapshot of one destination in the subscription registry.
///
/// Returned by [`LiveClient::subscriptions()`](crate::LiveClient::subscriptions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Destination the handlers listen on.
    pub destination: String,
    /// STOMP subscription id used on the wire (`sub-<n>`).
    pub subscription_id: String,
    /// Number of live handlers (always ≥ 1).
    pub handler_count: usize,
    /// Timestamp (millis since Unix epoch) when the destination was first bound.
    pub created_at_ms: u64,
    /// Timestamp (millis since Unix epoch) of the last delivered message,
    /// or `None` if nothing has arrived yet.
    pub last_message_time_ms: Option<u64>,
    /// Number of frames dispatched to this destination.
    pub delivered: u64,
}
