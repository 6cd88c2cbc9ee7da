//! Post, like and bookmark endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{
    cached_stats, error, post_views, spawn_mention_fan_out, spawn_notification, success,
    ApiResult,
};
use crate::auth::ActingUser;
use crate::errors::AppError;
use crate::mentions::prepare_submission;
use crate::models::{
    AttachmentPayload, ComposeContext, CreatePostRequest, NewNotification, NotificationKind, Post,
    PostStats, PostView, UpdatePostRequest,
};
use crate::optimistic::Optimistic;
use crate::AppState;

/// POST /api/posts - Publish a post and notify everyone it mentions.
pub async fn create_post(
    State(state): State<AppState>,
    user: ActingUser,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<Post> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let attachments = request
        .attachment
        .map(AttachmentPayload::into_vec)
        .unwrap_or_default();
    if request.body.trim().is_empty() && attachments.is_empty() {
        return error(
            AppError::Validation("A post needs text or an attachment".to_string()),
            revision_id,
        );
    }

    let submitted = prepare_submission(ComposeContext::Post, &request.body, request.mentions);

    match state
        .repo
        .create_post(user.id(), &submitted.text, &request.tags, &attachments)
        .await
    {
        Ok(post) => {
            if let Err(e) = state.search.index_post(&post).await {
                tracing::warn!("Failed to index post: {}", e);
            }
            state.cache.invalidate_feed().await;

            spawn_mention_fan_out(
                &state,
                submitted.mentions,
                user.id(),
                Some(post.id.clone()),
                None,
            );

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(post, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/posts/:id - A single post as the viewer sees it.
pub async fn get_post(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<PostView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let post = match state.repo.get_post(&id).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Post {} not found", id)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    match post_views(&state, vec![post], user.id()).await {
        Ok(mut views) => match views.pop() {
            Some(view) => success(view, revision_id),
            None => error(
                AppError::Internal("Post view missing".to_string()),
                revision_id,
            ),
        },
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/posts/:id - Edit a post.
pub async fn update_post(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
    Json(request): Json<UpdatePostRequest>,
) -> ApiResult<Post> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.update_post(&id, user.id(), &request).await {
        Ok(post) => {
            if let Err(e) = state.search.index_post(&post).await {
                tracing::warn!("Failed to re-index post: {}", e);
            }
            state.cache.invalidate_feed().await;

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(post, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/posts/:id - Delete a post and everything hanging off it.
pub async fn delete_post(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_post(&id, user.id()).await {
        Ok(()) => {
            if let Err(e) = state.search.remove_post(&id).await {
                tracing::warn!("Failed to remove post from index: {}", e);
            }
            state.cache.invalidate_feed().await;
            state.cache.invalidate_post_stats(&id).await;
            state.cache.unread.clear().await;

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/posts/:id/like
pub async fn like_post(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<PostStats> {
    set_like(state, user, id, true).await
}

/// DELETE /api/posts/:id/like
pub async fn unlike_post(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<PostStats> {
    set_like(state, user, id, false).await
}

async fn set_like(state: AppState, user: ActingUser, id: String, liked: bool) -> ApiResult<PostStats> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let initial = match cached_stats(&state, &id, user.id()).await {
        Ok(stats) => stats,
        Err(e) => return error(e, revision_id),
    };

    let key = (id.clone(), user.id().to_string());
    let ttl = state.cache.ttl;
    let mut changed = false;
    let mut stats = Optimistic::new(initial);

    // Readers see the flipped like while the write is in flight.
    let result = stats
        .run(
            |s| {
                if s.liked_by_viewer != liked {
                    s.like_count += if liked { 1 } else { -1 };
                    s.liked_by_viewer = liked;
                }
            },
            async {
                let (stats, did_change) = state.repo.set_like(&id, user.id(), liked).await?;
                changed = did_change;
                Ok::<_, AppError>(stats)
            },
            |value| {
                let cache = state.cache.clone();
                let key = key.clone();
                async move { cache.stats.set(key, value, ttl).await }
            },
        )
        .await;

    match result {
        Ok(confirmed) => {
            if changed {
                state.cache.invalidate_post_stats(&id).await;
                state.cache.stats.set(key, confirmed, ttl).await;
                state.cache.invalidate_feed().await;
            }
            if changed && liked {
                notify_post_author(&state, &id, user.id(), NotificationKind::Like).await;
            }
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(confirmed, new_revision)
        }
        Err(e) => {
            state.cache.stats.invalidate(&key).await;
            error(e, revision_id)
        }
    }
}

/// POST /api/posts/:id/bookmark
pub async fn bookmark_post(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<PostStats> {
    set_bookmark(state, user, id, true).await
}

/// DELETE /api/posts/:id/bookmark
pub async fn unbookmark_post(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<PostStats> {
    set_bookmark(state, user, id, false).await
}

async fn set_bookmark(
    state: AppState,
    user: ActingUser,
    id: String,
    bookmarked: bool,
) -> ApiResult<PostStats> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let initial = match cached_stats(&state, &id, user.id()).await {
        Ok(stats) => stats,
        Err(e) => return error(e, revision_id),
    };

    let key = (id.clone(), user.id().to_string());
    let ttl = state.cache.ttl;
    let mut stats = Optimistic::new(initial);

    let result = stats
        .run(
            |s| s.bookmarked_by_viewer = bookmarked,
            state.repo.set_bookmark(&id, user.id(), bookmarked),
            |value| {
                let cache = state.cache.clone();
                let key = key.clone();
                async move { cache.stats.set(key, value, ttl).await }
            },
        )
        .await;

    match result {
        Ok(confirmed) => success(confirmed, revision_id),
        Err(e) => {
            state.cache.stats.invalidate(&key).await;
            error(e, revision_id)
        }
    }
}

/// GET /api/bookmarks - The acting user's saved posts.
pub async fn list_bookmarks(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<Vec<PostView>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let posts = match state.repo.list_bookmarks(user.id()).await {
        Ok(posts) => posts,
        Err(e) => return error(e, revision_id),
    };

    match post_views(&state, posts, user.id()).await {
        Ok(views) => success(views, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// Tell a post's author someone interacted with it.
pub(crate) async fn notify_post_author(
    state: &AppState,
    post_id: &str,
    actor_user_id: &str,
    kind: NotificationKind,
) {
    match state.repo.get_post(post_id).await {
        Ok(Some(post)) => spawn_notification(
            state,
            NewNotification {
                recipient_user_id: post.author_id,
                actor_user_id: actor_user_id.to_string(),
                kind,
                related_post_id: Some(post.id),
                related_comment_id: None,
            },
        ),
        Ok(None) => {}
        Err(e) => tracing::warn!(post_id = %post_id, "Could not load post author: {}", e),
    }
}
