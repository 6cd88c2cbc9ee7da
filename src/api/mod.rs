//! REST API module.
//!
//! Contains all API routes and handlers. Every response uses the same
//! envelope carrying the current revision id.

mod chat;
mod comments;
mod feed;
mod mentions;
mod notifications;
mod posts;
mod profiles;
mod search;

pub use chat::*;
pub use comments::*;
pub use feed::*;
pub use mentions::*;
pub use notifications::*;
pub use posts::*;
pub use profiles::*;
pub use search::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::fanout::{fan_out_mentions, notify_best_effort, FanOutOutcome};
use crate::models::{AttachmentView, MentionInput, NewNotification, Post, PostStats, PostView};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: crate::errors::AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Viewer-specific stats, served from cache when fresh.
pub(crate) async fn cached_stats(
    state: &AppState,
    post_id: &str,
    viewer_id: &str,
) -> Result<PostStats, AppError> {
    let key = (post_id.to_string(), viewer_id.to_string());
    if let Some(stats) = state.cache.stats.get(&key).await {
        return Ok(stats);
    }
    let stats = state.repo.post_stats(post_id, viewer_id).await?;
    state.cache.stats.set(key, stats, state.cache.ttl).await;
    Ok(stats)
}

/// Decorate posts with their attachment layout and the viewer's flags.
pub(crate) async fn post_views(
    state: &AppState,
    posts: Vec<Post>,
    viewer_id: &str,
) -> Result<Vec<PostView>, AppError> {
    let mut views = Vec::with_capacity(posts.len());
    for mut post in posts {
        let stats = cached_stats(state, &post.id, viewer_id).await?;
        post.like_count = stats.like_count;
        views.push(PostView {
            attachment_view: AttachmentView::from_attachments(&post.attachments),
            liked_by_viewer: stats.liked_by_viewer,
            bookmarked_by_viewer: stats.bookmarked_by_viewer,
            post,
        });
    }
    Ok(views)
}

/// Fan mention notifications out in the background. The caller's write has
/// already succeeded; failures here only log.
pub(crate) fn spawn_mention_fan_out(
    state: &AppState,
    mentions: MentionInput,
    actor_user_id: &str,
    post_id: Option<String>,
    comment_id: Option<String>,
) {
    let fanout = state.fanout.clone();
    let cache = state.cache.clone();
    let actor = actor_user_id.to_string();
    tokio::spawn(async move {
        let outcome = fan_out_mentions(
            fanout.as_ref(),
            mentions,
            &actor,
            post_id.as_deref(),
            comment_id.as_deref(),
        )
        .await;
        if let FanOutOutcome::Sent { .. } = outcome {
            cache.unread.clear().await;
        }
    });
}

/// Write one like/comment/reply/follow notification in the background.
pub(crate) fn spawn_notification(state: &AppState, notification: NewNotification) {
    let fanout = state.fanout.clone();
    let cache = state.cache.clone();
    tokio::spawn(async move {
        let recipient = notification.recipient_user_id.clone();
        notify_best_effort(fanout.as_ref(), notification).await;
        cache.unread.invalidate(&recipient).await;
    });
}
