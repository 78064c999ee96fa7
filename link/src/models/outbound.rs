//! Payloads published to the `/app/team.*` action destinations.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::user_notification::NotificationKind;

/// Current time as an ISO-8601 UTC string with millisecond precision.
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Body of the team-notify action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamNotifyRequest {
    pub team_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub timestamp: String,
}

/// Body of the team-join action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamJoinRequest {
    pub team_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingScheduleRequest {
    pub team_id: String,
    pub title: String,
    /// ISO-8601 start time of the meeting.
    pub scheduled_for: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelpPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpRequest {
    pub team_id: String,
    pub message: String,
    pub priority: HelpPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintStartRequest {
    pub team_id: String,
    pub sprint_number: u32,
    pub start_date: String,
}
