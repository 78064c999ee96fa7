use serde::{Deserialize, Serialize};

/// Broadcast delivered on the admin-only channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNotification {
    pub id: String,
    pub title: String,
    pub message: String,
    /// Administrative action that triggered the broadcast (e.g. `USER_CREATED`).
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub timestamp: String,
}
