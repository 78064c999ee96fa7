use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{LinkError, Result};

use super::admin_notification::AdminNotification;
use super::destinations::{Destinations, MessageKind};
use super::team_update::TeamUpdate;
use super::user_notification::UserNotification;

/// Decoded payload of an inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LiveMessage {
    UserNotification(UserNotification),
    TeamUpdate(TeamUpdate),
    AdminNotification(AdminNotification),
    /// Body of a destination without a known payload shape.
    Raw(JsonValue),
}

impl LiveMessage {
    /// Decode `body` with the decoder the destination calls for.
    pub fn decode(kind: MessageKind, body: &str) -> Result<Self> {
        let decoded = match kind {
            MessageKind::UserNotification => {
                serde_json::from_str(body).map(LiveMessage::UserNotification)
            },
            MessageKind::TeamUpdate => serde_json::from_str(body).map(LiveMessage::TeamUpdate),
            MessageKind::AdminNotification => {
                serde_json::from_str(body).map(LiveMessage::AdminNotification)
            },
            MessageKind::Raw => serde_json::from_str(body).map(LiveMessage::Raw),
        };
        decoded.map_err(|e| LinkError::DecodeFailure(format!("{:?} payload: {}", kind, e)))
    }

    pub fn as_user_notification(&self) -> Option<&UserNotification> {
        match self {
            LiveMessage::UserNotification(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_team_update(&self) -> Option<&TeamUpdate> {
        match self {
            LiveMessage::TeamUpdate(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_admin_notification(&self) -> Option<&AdminNotification> {
        match self {
            LiveMessage::AdminNotification(n) => Some(n),
            _ => None,
        }
    }
}

/// A decoded message as handed to subscription handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Destination the frame arrived on.
    pub destination: String,
    pub message: LiveMessage,
    /// Millis since Unix epoch when the frame was received.
    pub received_at_ms: u64,
}

impl InboundMessage {
    /// Decode a raw frame body for `destination`.
    pub fn decode(
        destinations: &Destinations,
        destination: &str,
        body: &str,
        received_at_ms: u64,
    ) -> Result<Self> {
        let message = LiveMessage::decode(destinations.kind_of(destination), body)?;
        Ok(Self {
            destination: destination.to_string(),
            message,
            received_at_ms,
        })
    }
}
