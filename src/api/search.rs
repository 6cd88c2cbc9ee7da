//! Full-text post search.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{error, post_views, success, ApiResult};
use crate::auth::ActingUser;
use crate::models::PostView;
use crate::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct PostSearchQuery {
    pub q: String,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// A matching post as the viewer sees it, with its relevance score.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub post: PostView,
    pub score: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// GET /api/search - Posts matching `q`, best match first.
pub async fn search_posts(
    State(state): State<AppState>,
    user: ActingUser,
    Query(params): Query<PostSearchQuery>,
) -> ApiResult<SearchPage> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);

    let matches = match state.search.search(&params.q, limit, params.offset) {
        Ok(matches) => matches,
        Err(e) => return error(e, revision_id),
    };

    // The index can briefly lag a delete; such hits are dropped.
    let mut posts = Vec::with_capacity(matches.len());
    let mut scores = Vec::with_capacity(matches.len());
    for hit in matches {
        match state.repo.get_post(&hit.post_id).await {
            Ok(Some(post)) => {
                posts.push(post);
                scores.push(hit.score);
            }
            Ok(None) => {
                tracing::debug!(post_id = %hit.post_id, "Skipping search hit for deleted post")
            }
            Err(e) => return error(e, revision_id),
        }
    }

    let views = match post_views(&state, posts, user.id()).await {
        Ok(views) => views,
        Err(e) => return error(e, revision_id),
    };
    let hits: Vec<SearchHit> = views
        .into_iter()
        .zip(scores)
        .map(|(post, score)| SearchHit { post, score })
        .collect();

    success(
        SearchPage {
            query: params.q,
            total: hits.len(),
            hits,
            limit,
            offset: params.offset,
        },
        revision_id,
    )
}
