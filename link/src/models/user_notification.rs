use serde::{Deserialize, Serialize};

/// Severity/category carried in the `type` field of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
    TeamUpdate,
    Admin,
}

/// Notification delivered on the general channel or the private user queue.
///
/// # JSON Wire Format
///
/// ```json
/// {"id": "n-1", "title": "Hi", "message": "Welcome", "type": "INFO",
///  "userId": "u-1", "timestamp": "2024-05-01T10:00:00.000Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub timestamp: String,
}
