//! Feed and revision endpoints.

use axum::extract::{Query, State};

use super::{error, post_views, success, ApiResult};
use crate::auth::ActingUser;
use crate::models::{FeedQuery, PostView, RevisionInfo};
use crate::AppState;

const MAX_FEED_LIMIT: usize = 100;

/// GET /api/feed/revision - Lightweight change check for polling clients.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    match state.repo.get_revision_info().await {
        Ok(info) => {
            let revision_id = info.revision_id;
            success(info, revision_id)
        }
        Err(e) => error(e, 0),
    }
}

/// GET /api/posts - The feed, newest posts first.
pub async fn get_feed(
    State(state): State<AppState>,
    user: ActingUser,
    Query(params): Query<FeedQuery>,
) -> ApiResult<Vec<PostView>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let key = (params.limit.min(MAX_FEED_LIMIT), params.offset);

    let posts = match state.cache.feed.get(&key).await {
        Some(posts) => posts,
        None => match state.repo.list_feed(key.0, key.1).await {
            Ok(posts) => {
                state.cache.feed.set(key, posts.clone(), state.cache.ttl).await;
                posts
            }
            Err(e) => return error(e, revision_id),
        },
    };

    match post_views(&state, posts, user.id()).await {
        Ok(views) => success(views, revision_id),
        Err(e) => error(e, revision_id),
    }
}
