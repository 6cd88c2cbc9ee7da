//! Direct chat with the assistant.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::assistant::{chat, ChatQuestion};
use crate::auth::ActingUser;
use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantChatRequest {
    pub message: String,
    /// Ask about this post instead of a general question.
    #[serde(default)]
    pub post_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssistantChatReply {
    pub reply: String,
}

/// POST /api/assistant/chat - Ask the assistant directly; the answer is
/// returned, not posted.
pub async fn assistant_chat(
    State(state): State<AppState>,
    user: ActingUser,
    Json(request): Json<AssistantChatRequest>,
) -> ApiResult<AssistantChatReply> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let asker_username = match state.repo.get_profile(user.id()).await {
        Ok(Some(profile)) => profile.username,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Profile {} not found", user.id())),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    let question = ChatQuestion {
        asker_username,
        message: request.message,
        post_id: request.post_id,
    };

    match chat(&*state.repo, state.llm.as_ref(), &question).await {
        Ok(reply) => success(AssistantChatReply { reply }, revision_id),
        Err(e) => {
            tracing::warn!(user_id = %user.id(), "Assistant chat failed: {}", e);
            error(e, revision_id)
        }
    }
}
