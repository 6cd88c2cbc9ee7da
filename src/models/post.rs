//! Post and comment models.

use serde::{Deserialize, Serialize};

use super::{Attachment, AttachmentPayload, AttachmentView, MentionInput};

/// A feed post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// A post decorated with its attachment layout and the viewer's flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub attachment_view: AttachmentView,
    pub liked_by_viewer: bool,
    pub bookmarked_by_viewer: bool,
}

/// Request body for creating a new post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentPayload>,
    /// Resolved mentions from the compose session (candidates or usernames)
    #[serde(default)]
    pub mentions: Option<MentionInput>,
}

/// Request body for editing a post. Only body and tags are editable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Feed paging parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_feed_limit() -> usize {
    20
}

/// Like count and the viewer's like/bookmark flags for one post.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostStats {
    pub like_count: i64,
    pub liked_by_viewer: bool,
    pub bookmarked_by_viewer: bool,
}

/// A comment or, when `parent_id` is set, a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: String,
}

/// Request body for creating a comment or reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentPayload>,
    #[serde(default)]
    pub mentions: Option<MentionInput>,
}

/// Storage-level input for a new comment row.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub body: String,
    pub attachments: Vec<Attachment>,
}
