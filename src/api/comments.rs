//! Comment and reply endpoints.
//!
//! A top-level comment that mentions the assistant gets an answer posted as
//! a threaded reply once the language model responds.

use axum::{
    extract::{Path, State},
    Json,
};

use super::posts::notify_post_author;
use super::{error, spawn_mention_fan_out, spawn_notification, success, ApiResult};
use crate::assistant::{respond, AssistantTrigger};
use crate::auth::ActingUser;
use crate::errors::AppError;
use crate::mentions::prepare_submission;
use crate::models::{
    AttachmentPayload, Comment, ComposeContext, CreateCommentRequest, NewComment, NewNotification,
    NotificationKind,
};
use crate::AppState;

/// GET /api/posts/:id/comments - Comments and replies, oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<Vec<Comment>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_comments(&post_id).await {
        Ok(comments) => success(comments, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/posts/:id/comments - Comment on a post or reply to a comment.
pub async fn create_comment(
    State(state): State<AppState>,
    user: ActingUser,
    Path(post_id): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<Comment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let attachments = request
        .attachment
        .map(AttachmentPayload::into_vec)
        .unwrap_or_default();
    if request.body.trim().is_empty() && attachments.is_empty() {
        return error(
            AppError::Validation("A comment needs text or an attachment".to_string()),
            revision_id,
        );
    }

    let context = if request.parent_id.is_some() {
        ComposeContext::Reply
    } else {
        ComposeContext::Comment
    };
    let submitted = prepare_submission(context, &request.body, request.mentions);

    let new_comment = NewComment {
        post_id,
        author_id: user.id().to_string(),
        parent_id: request.parent_id,
        body: submitted.text.clone(),
        attachments,
    };

    let comment = match state.repo.insert_comment(&new_comment).await {
        Ok(comment) => comment,
        Err(e) => return error(e, revision_id),
    };
    state.cache.invalidate_feed().await;

    spawn_mention_fan_out(
        &state,
        submitted.mentions,
        user.id(),
        Some(comment.post_id.clone()),
        Some(comment.id.clone()),
    );

    match &comment.parent_id {
        Some(parent_id) => notify_parent_author(&state, parent_id, &comment).await,
        None => {
            notify_post_author(&state, &comment.post_id, user.id(), NotificationKind::Comment)
                .await
        }
    }

    if submitted.summon_assistant {
        spawn_assistant_reply(
            &state,
            AssistantTrigger {
                post_id: comment.post_id.clone(),
                comment_id: comment.id.clone(),
                message: comment.body.clone(),
            },
        );
    }

    let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
    success(comment, new_revision)
}

/// DELETE /api/comments/:id - Delete a comment with its replies.
pub async fn delete_comment(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_comment(&id, user.id()).await {
        Ok(_) => {
            state.cache.invalidate_feed().await;
            state.cache.unread.clear().await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

async fn notify_parent_author(state: &AppState, parent_id: &str, reply: &Comment) {
    match state.repo.get_comment(parent_id).await {
        Ok(Some(parent)) => spawn_notification(
            state,
            NewNotification {
                recipient_user_id: parent.author_id,
                actor_user_id: reply.author_id.clone(),
                kind: NotificationKind::Reply,
                related_post_id: Some(reply.post_id.clone()),
                related_comment_id: Some(reply.id.clone()),
            },
        ),
        Ok(None) => {}
        Err(e) => tracing::warn!(comment_id = %parent_id, "Could not load parent comment: {}", e),
    }
}

fn spawn_assistant_reply(state: &AppState, trigger: AssistantTrigger) {
    let repo = state.repo.clone();
    let llm = state.llm.clone();
    let cache = state.cache.clone();
    tokio::spawn(async move {
        if respond(&*repo, llm.as_ref(), &trigger).await.is_some() {
            cache.invalidate_feed().await;
        }
    });
}
