//! Well-known destination names.
//!
//! Destinations are plain strings matched exactly by the router. The team
//! channel is a template (`{teamId}` placeholder) that callers resolve to a
//! concrete string with [`Destinations::team`] before subscribing.

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the team identifier in [`Destinations::team_template`].
pub const TEAM_ID_PLACEHOLDER: &str = "{teamId}";

/// Payload shape expected on a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    UserNotification,
    TeamUpdate,
    AdminNotification,
    /// Unknown destination; the body is delivered as raw JSON.
    Raw,
}

/// Destination names used by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destinations {
    /// Broadcast notifications for every user.
    pub general_notifications: String,
    /// Private queue for the authenticated user.
    pub user_notifications: String,
    /// Per-team channel; must contain `{teamId}`.
    pub team_template: String,
    /// Admin-only broadcast channel.
    pub admin_broadcast: String,
    pub team_notify: String,
    pub team_join: String,
    pub team_meeting_schedule: String,
    pub team_help_request: String,
    pub team_sprint_start: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            general_notifications: "/topic/notifications".to_string(),
            user_notifications: "/user/queue/notifications".to_string(),
            team_template: "/topic/teams/{teamId}".to_string(),
            admin_broadcast: "/topic/admin".to_string(),
            team_notify: "/app/team.notify".to_string(),
            team_join: "/app/team.join".to_string(),
            team_meeting_schedule: "/app/team.meeting.schedule".to_string(),
            team_help_request: "/app/team.help.request".to_string(),
            team_sprint_start: "/app/team.sprint.start".to_string(),
        }
    }
}

impl Destinations {
    /// Resolve the per-team channel for `team_id`.
    pub fn team(&self, team_id: &str) -> String {
        self.team_template.replace(TEAM_ID_PLACEHOLDER, team_id)
    }

    /// Extract the team id from a concrete team destination, if it is one.
    pub fn team_id_of<'a>(&self, destination: &'a str) -> Option<&'a str> {
        let (prefix, suffix) = self.team_template.split_once(TEAM_ID_PLACEHOLDER)?;
        let id = destination.strip_prefix(prefix)?.strip_suffix(suffix)?;
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// Pick the decoder for an inbound destination.
    pub fn kind_of(&self, destination: &str) -> MessageKind {
        if destination == self.general_notifications || destination == self.user_notifications {
            MessageKind::UserNotification
        } else if destination == self.admin_broadcast {
            MessageKind::AdminNotification
        } else if self.team_id_of(destination).is_some() {
            MessageKind::TeamUpdate
        } else {
            MessageKind::Raw
        }
    }
}
