//! Language model client used by the assistant.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Attachment, AttachmentKind};

const SYSTEM_PROMPT: &str = "You are EduHive AI, a helpful study assistant inside a student \
community. Answer the student's question about the post concisely and accurately. \
If the question cannot be answered from the post, say so and give general guidance.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Structured prompt handed to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// What the student asked, with the assistant mention removed.
    pub instruction: String,
    /// The post (and author) the question is about.
    pub context: String,
    pub attachments: Vec<Attachment>,
}

/// A non-streaming text completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, AppError>;
}

/// OpenAI-compatible `chat/completions` client.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpLanguageModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_headers(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| AppError::Internal(format!("Invalid LLM API key header: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn build_body(&self, prompt: &Prompt) -> Value {
        let mut parts = vec![json!({
            "type": "text",
            "text": render_user_message(prompt),
        })];
        for image in prompt
            .attachments
            .iter()
            .filter(|a| a.kind() == AttachmentKind::Image)
        {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": image.url },
            }));
        }

        json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": parts },
            ],
        })
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&self.build_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Language model returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        Ok(text)
    }
}

/// Used when no API key is configured; every call fails.
pub struct DisabledLanguageModel;

#[async_trait]
impl LanguageModel for DisabledLanguageModel {
    async fn complete(&self, _prompt: &Prompt) -> Result<String, AppError> {
        Err(AppError::Upstream(
            "Assistant is disabled (EDUHIVE_LLM_API_KEY not set)".to_string(),
        ))
    }
}

/// Pick the model backend from configuration.
pub fn language_model_from_config(config: &Config) -> Box<dyn LanguageModel> {
    match &config.llm_api_key {
        Some(key) => Box::new(HttpLanguageModel::new(
            config.llm_api_url.clone(),
            key.clone(),
            config.llm_model.clone(),
        )),
        None => Box::new(DisabledLanguageModel),
    }
}

/// Flatten the prompt into the user turn.
pub fn render_user_message(prompt: &Prompt) -> String {
    let mut out = format!("{}\n\nQuestion: {}", prompt.context, prompt.instruction);
    if !prompt.attachments.is_empty() {
        out.push_str("\n\nAttachments:");
        for a in &prompt.attachments {
            let kind = match a.kind() {
                AttachmentKind::Image => "image",
                AttachmentKind::Pdf => "pdf",
                AttachmentKind::Other => "file",
            };
            out.push_str(&format!("\n- {}: {}", kind, a.url));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            instruction: "explain this".to_string(),
            context: "Post by @alice:\nDerivatives cheat sheet".to_string(),
            attachments: vec![
                Attachment {
                    url: "https://cdn/sheet.png".to_string(),
                    content_type: "image/png".to_string(),
                },
                Attachment {
                    url: "https://cdn/notes.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_render_user_message_lists_attachments() {
        let text = render_user_message(&prompt());
        assert!(text.contains("Question: explain this"));
        assert!(text.contains("- image: https://cdn/sheet.png"));
        assert!(text.contains("- pdf: https://cdn/notes.pdf"));
    }

    #[test]
    fn test_body_attaches_only_images() {
        let model = HttpLanguageModel::new("http://localhost/v1/", "k", "m");
        let body = model.build_body(&prompt());
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["image_url"]["url"], "https://cdn/sheet.png");
        assert_eq!(body["stream"], false);
        assert_eq!(model.base_url, "http://localhost/v1");
    }

    #[tokio::test]
    async fn test_disabled_model_errors() {
        let err = DisabledLanguageModel.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
