use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Kind of change announced on a team channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamAction {
    MemberAdded,
    MemberRemoved,
    TeamUpdated,
    TeamDeleted,
}

/// Update published on a per-team channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamUpdate {
    pub team_id: String,
    pub action: TeamAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
    pub updated_by: String,
    pub timestamp: String,
    /// Free-form extra data attached by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}
