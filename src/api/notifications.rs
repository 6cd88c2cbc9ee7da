//! Notification endpoints.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::auth::ActingUser;
use crate::models::{Notification, UnreadCount};
use crate::AppState;

const MAX_NOTIFICATIONS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/notifications - The acting user's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    user: ActingUser,
    Query(params): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .list_notifications(user.id(), params.limit.min(MAX_NOTIFICATIONS))
        .await
    {
        Ok(list) => success(list, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/notifications/unread-count - Badge count.
pub async fn unread_count(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<UnreadCount> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let key = user.id().to_string();

    if let Some(unread) = state.cache.unread.get(&key).await {
        return success(UnreadCount { unread }, revision_id);
    }

    match state.repo.unread_count(user.id()).await {
        Ok(unread) => {
            state.cache.unread.set(key, unread, state.cache.ttl).await;
            success(UnreadCount { unread }, revision_id)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.mark_read(&id, user.id()).await {
        Ok(()) => {
            state.cache.unread.invalidate(&user.id().to_string()).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notifications/read-all - Returns how many were marked.
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<u64> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.mark_all_read(user.id()).await {
        Ok(changed) => {
            state.cache.unread.invalidate(&user.id().to_string()).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(changed, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
