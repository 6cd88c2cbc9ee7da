//! Notification model.

use serde::{Deserialize, Serialize};

/// What triggered a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Mention,
    Like,
    Comment,
    Follow,
    Reply,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Mention => "mention",
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Reply => "reply",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mention" => Some(NotificationKind::Mention),
            "like" => Some(NotificationKind::Like),
            "comment" => Some(NotificationKind::Comment),
            "follow" => Some(NotificationKind::Follow),
            "reply" => Some(NotificationKind::Reply),
            _ => None,
        }
    }

    /// Human-readable message shown in the notification list.
    pub fn message(&self, actor_username: &str) -> String {
        match self {
            NotificationKind::Mention => format!("@{} mentioned you", actor_username),
            NotificationKind::Like => format!("@{} liked your post", actor_username),
            NotificationKind::Comment => format!("@{} commented on your post", actor_username),
            NotificationKind::Follow => format!("@{} started following you", actor_username),
            NotificationKind::Reply => format!("@{} replied to your comment", actor_username),
        }
    }
}

/// A notification row. Ids and timestamps are always assigned server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_user_id: String,
    pub actor_user_id: String,
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_comment_id: Option<String>,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

/// Input for a single direct (non-mention) notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_user_id: String,
    pub actor_user_id: String,
    pub kind: NotificationKind,
    pub related_post_id: Option<String>,
    pub related_comment_id: Option<String>,
}

/// Unread badge count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread: i64,
}
