//! Mention composer endpoints.
//!
//! Clients send the draft on every keystroke; the server owns token
//! detection, suggestion lookup and mention splicing.

use axum::{
    extract::{Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::auth::ActingUser;
use crate::errors::AppError;
use crate::mentions::{committed_mentions, resolve_candidates, ComposeSession};
use crate::models::{
    ApplyMentionRequest, ComposeDraft, ComposeUpdate, MentionCandidate, ScanRequest,
    SuggestionQuery,
};
use crate::AppState;

/// GET /api/mentions/suggestions - Candidates for a partial username.
pub async fn mention_suggestions(
    State(state): State<AppState>,
    user: ActingUser,
    Query(params): Query<SuggestionQuery>,
) -> ApiResult<Vec<MentionCandidate>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let partial = params.q.trim().trim_start_matches('@');
    let candidates = resolve_candidates(
        &*state.repo,
        partial,
        user.id(),
        params.context.allows_assistant_mention(),
    )
    .await;

    success(candidates, revision_id)
}

/// POST /api/mentions/sync - Reconcile a draft after an edit.
///
/// Drops resolved mentions whose text was deleted and returns suggestions
/// for the token at the caret, if any.
pub async fn sync_mentions(
    State(state): State<AppState>,
    user: ActingUser,
    Json(draft): Json<ComposeDraft>,
) -> ApiResult<ComposeUpdate> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let text = draft.text.clone();
    let caret = draft.caret;
    let mut session = ComposeSession::restore(draft);
    session
        .edit_and_resolve(&*state.repo, user.id(), text, caret)
        .await;

    success(compose_update(session), revision_id)
}

/// POST /api/mentions/apply - Splice a chosen suggestion into the draft.
pub async fn apply_suggestion(
    State(state): State<AppState>,
    Json(request): Json<ApplyMentionRequest>,
) -> ApiResult<ComposeUpdate> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.selected.is_assistant() && !request.draft.context.allows_assistant_mention() {
        return error(
            AppError::Validation("The assistant can only be mentioned in comments".to_string()),
            revision_id,
        );
    }

    let mut session = ComposeSession::restore(request.draft);
    session.select(request.selected);

    success(compose_update(session), revision_id)
}

/// POST /api/mentions/scan - Usernames committed in a finished text.
pub async fn scan_mentions(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Vec<String>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    success(committed_mentions(&request.text), revision_id)
}

fn compose_update(session: ComposeSession) -> ComposeUpdate {
    ComposeUpdate {
        open_token: session.open_token(),
        suggestions: session.suggestions().to_vec(),
        resolved: session.resolved().to_candidates(),
        known: session.resolved().known_candidates(),
        caret: session.caret(),
        text: session.text().to_string(),
    }
}
