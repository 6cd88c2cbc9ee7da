//! Assistant responder.
//!
//! When a top-level comment mentions the assistant, the post is turned into
//! a prompt, sent to the language model, and the answer is posted as a
//! threaded reply authored by the assistant identity.

mod llm;

pub use llm::*;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{Comment, NewComment, Post, ASSISTANT_USERNAME, ASSISTANT_USER_ID};

/// Content access the responder needs.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError>;

    async fn create_comment(&self, new_comment: &NewComment) -> Result<Comment, AppError>;
}

/// A direct question to the assistant, optionally about one post.
#[derive(Debug, Clone)]
pub struct ChatQuestion {
    pub asker_username: String,
    pub message: String,
    pub post_id: Option<String>,
}

/// The comment that summoned the assistant.
#[derive(Debug, Clone)]
pub struct AssistantTrigger {
    pub post_id: String,
    pub comment_id: String,
    pub message: String,
}

/// Strip assistant mentions from the message, leaving the request itself.
pub fn extract_request(message: &str) -> String {
    let mention = format!("@{}", ASSISTANT_USERNAME);
    let words: Vec<&str> = message
        .split_whitespace()
        .filter(|w| {
            let bare = w.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '_');
            !bare.eq_ignore_ascii_case(&mention)
        })
        .collect();
    words.join(" ")
}

/// Build the prompt for a question about `post`.
pub fn build_prompt(post: &Post, message: &str) -> Prompt {
    let request = extract_request(message);
    let instruction = if request.is_empty() {
        "Explain this post.".to_string()
    } else {
        request
    };

    let mut context = format!("Post by @{}:\n{}", post.author_username, post.body);
    if !post.tags.is_empty() {
        context.push_str(&format!("\nTags: {}", post.tags.join(", ")));
    }
    context.push_str(&format!("\n\nStudent's full comment: {}", message.trim()));

    Prompt {
        instruction,
        context,
        attachments: post.attachments.clone(),
    }
}

/// Answer a trigger and post the reply. Any failure is logged and no reply
/// is written; the student's own comment is never affected.
pub async fn respond(
    store: &dyn ContentStore,
    model: &dyn LanguageModel,
    trigger: &AssistantTrigger,
) -> Option<Comment> {
    match try_respond(store, model, trigger).await {
        Ok(reply) => {
            tracing::info!(
                post_id = %trigger.post_id,
                parent_id = %trigger.comment_id,
                reply_id = %reply.id,
                "Assistant replied"
            );
            Some(reply)
        }
        Err(e) => {
            tracing::warn!(
                post_id = %trigger.post_id,
                comment_id = %trigger.comment_id,
                "Assistant reply aborted: {}",
                e
            );
            None
        }
    }
}

async fn try_respond(
    store: &dyn ContentStore,
    model: &dyn LanguageModel,
    trigger: &AssistantTrigger,
) -> Result<Comment, AppError> {
    let post = store
        .get_post(&trigger.post_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post {} not found", trigger.post_id)))?;

    let prompt = build_prompt(&post, &trigger.message);
    let answer = ask(model, &prompt).await?;

    store
        .create_comment(&NewComment {
            post_id: post.id,
            author_id: ASSISTANT_USER_ID.to_string(),
            parent_id: Some(trigger.comment_id.clone()),
            body: answer,
            attachments: Vec::new(),
        })
        .await
}

/// Answer a direct question. Unlike [`respond`], errors go back to the caller
/// and nothing is written.
pub async fn chat(
    store: &dyn ContentStore,
    model: &dyn LanguageModel,
    question: &ChatQuestion,
) -> Result<String, AppError> {
    let prompt = match &question.post_id {
        Some(post_id) => {
            let post = store
                .get_post(post_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;
            build_prompt(&post, &question.message)
        }
        None => {
            let instruction = extract_request(&question.message);
            if instruction.is_empty() {
                return Err(AppError::Validation("Message cannot be empty".to_string()));
            }
            Prompt {
                instruction,
                context: format!(
                    "Direct question from @{}; no post attached.",
                    question.asker_username
                ),
                attachments: Vec::new(),
            }
        }
    };

    ask(model, &prompt).await
}

async fn ask(model: &dyn LanguageModel, prompt: &Prompt) -> Result<String, AppError> {
    let answer = model.complete(prompt).await?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(AppError::Upstream(
            "Language model returned an empty answer".to_string(),
        ));
    }
    Ok(answer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment;
    use tokio::sync::Mutex;

    struct MemoryStore {
        post: Option<Post>,
        created: Mutex<Vec<NewComment>>,
        fail_insert: bool,
    }

    impl MemoryStore {
        fn with_post() -> Self {
            Self {
                post: Some(Post {
                    id: "p1".to_string(),
                    author_id: "u1".to_string(),
                    author_username: "alice".to_string(),
                    body: "Integration by parts cheat sheet".to_string(),
                    tags: vec!["calculus".to_string()],
                    attachments: vec![Attachment {
                        url: "https://cdn/sheet.png".to_string(),
                        content_type: "image/png".to_string(),
                    }],
                    like_count: 0,
                    comment_count: 1,
                    created_at: "2026-01-01T00:00:00Z".to_string(),
                    updated_at: "2026-01-01T00:00:00Z".to_string(),
                    version: 1,
                }),
                created: Mutex::new(Vec::new()),
                fail_insert: false,
            }
        }
    }

    #[async_trait]
    impl ContentStore for MemoryStore {
        async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
            Ok(self.post.clone().filter(|p| p.id == id))
        }

        async fn create_comment(&self, new_comment: &NewComment) -> Result<Comment, AppError> {
            if self.fail_insert {
                return Err(AppError::Database("disk full".to_string()));
            }
            self.created.lock().await.push(new_comment.clone());
            Ok(Comment {
                id: "reply-1".to_string(),
                post_id: new_comment.post_id.clone(),
                author_id: new_comment.author_id.clone(),
                author_username: ASSISTANT_USERNAME.to_string(),
                parent_id: new_comment.parent_id.clone(),
                body: new_comment.body.clone(),
                attachments: Vec::new(),
                created_at: "2026-01-01T00:00:01Z".to_string(),
            })
        }
    }

    struct CannedModel(Result<String, ()>);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, prompt: &Prompt) -> Result<String, AppError> {
            assert_eq!(prompt.instruction, "explain this");
            self.0
                .clone()
                .map_err(|_| AppError::Upstream("model unavailable".to_string()))
        }
    }

    fn trigger() -> AssistantTrigger {
        AssistantTrigger {
            post_id: "p1".to_string(),
            comment_id: "c1".to_string(),
            message: "@eduhive explain this".to_string(),
        }
    }

    #[test]
    fn test_extract_request() {
        assert_eq!(extract_request("ask @eduhive to explain this"), "ask to explain this");
        assert_eq!(extract_request("@EduHive, why?"), "why?");
        assert_eq!(extract_request("@eduhive"), "");
        assert_eq!(extract_request("@eduhive_fan hi"), "@eduhive_fan hi");
    }

    #[test]
    fn test_build_prompt_includes_post_context() {
        let store = MemoryStore::with_post();
        let prompt = build_prompt(store.post.as_ref().unwrap(), "@eduhive");
        assert_eq!(prompt.instruction, "Explain this post.");
        assert!(prompt.context.contains("Post by @alice"));
        assert!(prompt.context.contains("Tags: calculus"));
        assert_eq!(prompt.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_is_threaded_under_trigger() {
        let store = MemoryStore::with_post();
        let model = CannedModel(Ok("  Integrate u dv = uv - ∫ v du.  ".to_string()));

        let reply = respond(&store, &model, &trigger()).await.unwrap();
        assert_eq!(reply.parent_id.as_deref(), Some("c1"));
        assert_eq!(reply.author_id, ASSISTANT_USER_ID);
        assert_eq!(reply.body, "Integrate u dv = uv - ∫ v du.");
    }

    fn question(message: &str, post_id: Option<&str>) -> ChatQuestion {
        ChatQuestion {
            asker_username: "bob".to_string(),
            message: message.to_string(),
            post_id: post_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_chat_answers_without_writing() {
        let store = MemoryStore::with_post();
        let model = CannedModel(Ok(" Use the product rule. ".to_string()));

        let answer = chat(&store, &model, &question("explain this", None))
            .await
            .unwrap();
        assert_eq!(answer, "Use the product rule.");

        let answer = chat(&store, &model, &question("@eduhive explain this", Some("p1")))
            .await
            .unwrap();
        assert_eq!(answer, "Use the product rule.");
        assert!(store.created.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_and_unknown_post() {
        let store = MemoryStore::with_post();
        let model = CannedModel(Ok("unused".to_string()));

        let err = chat(&store, &model, &question("  @eduhive ", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = chat(&store, &model, &question("explain this", Some("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_chat_surfaces_model_failure() {
        let store = MemoryStore::with_post();
        let model = CannedModel(Err(()));
        let err = chat(&store, &model, &question("explain this", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_model_failure_writes_nothing() {
        let store = MemoryStore::with_post();
        let model = CannedModel(Err(()));

        assert!(respond(&store, &model, &trigger()).await.is_none());
        assert!(store.created.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_writes_nothing() {
        let store = MemoryStore::with_post();
        let model = CannedModel(Ok("   ".to_string()));

        assert!(respond(&store, &model, &trigger()).await.is_none());
        assert!(store.created.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_post_aborts() {
        let mut store = MemoryStore::with_post();
        store.post = None;
        let model = CannedModel(Ok("answer".to_string()));

        assert!(respond(&store, &model, &trigger()).await.is_none());
    }

    #[tokio::test]
    async fn test_insert_failure_is_swallowed() {
        let mut store = MemoryStore::with_post();
        store.fail_insert = true;
        let model = CannedModel(Ok("answer".to_string()));

        assert!(respond(&store, &model, &trigger()).await.is_none());
    }
}
