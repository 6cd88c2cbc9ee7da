//! Mention candidates, compose contexts and the reserved assistant identity.

use serde::{Deserialize, Serialize};

/// Fixed profile id of the in-app assistant.
pub const ASSISTANT_USER_ID: &str = "00000000-0000-0000-0000-0000000000a1";
/// Username the assistant is mentioned by.
pub const ASSISTANT_USERNAME: &str = "eduhive";
/// Display name of the assistant.
pub const ASSISTANT_DISPLAY_NAME: &str = "EduHive AI";

/// True for the reserved assistant profile id.
pub fn is_assistant_identity(user_id: &str) -> bool {
    user_id == ASSISTANT_USER_ID
}

/// True for the reserved assistant username (case-insensitive).
pub fn is_assistant_username(username: &str) -> bool {
    username.eq_ignore_ascii_case(ASSISTANT_USERNAME)
}

/// A profile that can be mentioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MentionCandidate {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl MentionCandidate {
    /// The reserved assistant identity as a candidate.
    pub fn assistant() -> Self {
        Self {
            id: ASSISTANT_USER_ID.to_string(),
            username: ASSISTANT_USERNAME.to_string(),
            display_name: ASSISTANT_DISPLAY_NAME.to_string(),
            avatar_url: None,
        }
    }

    pub fn is_assistant(&self) -> bool {
        is_assistant_identity(&self.id)
    }
}

/// Mentions handed to fan-out: plain usernames from older clients, or
/// resolved candidates from a compose session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MentionInput {
    Usernames(Vec<String>),
    Candidates(Vec<MentionCandidate>),
}

impl MentionInput {
    /// Canonical username list: trimmed, `@` stripped, deduplicated
    /// case-insensitively in first-appearance order.
    pub fn into_usernames(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            MentionInput::Usernames(names) => names,
            MentionInput::Candidates(candidates) => {
                candidates.into_iter().map(|c| c.username).collect()
            }
        };

        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for name in raw {
            let name = name.trim().trim_start_matches('@');
            if name.is_empty() || out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                continue;
            }
            out.push(name.to_string());
        }
        out
    }
}

/// Where a draft is being composed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComposeContext {
    #[default]
    Post,
    Comment,
    Reply,
}

impl ComposeContext {
    /// Only top-level comments may summon the assistant.
    pub fn allows_assistant_mention(&self) -> bool {
        matches!(self, ComposeContext::Comment)
    }
}

/// Query string for the suggestion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub context: ComposeContext,
}

/// Draft state exchanged with clients on every keystroke.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeDraft {
    #[serde(default)]
    pub context: ComposeContext,
    pub text: String,
    pub caret: usize,
    #[serde(default)]
    pub resolved: Vec<MentionCandidate>,
    /// Candidates resolved earlier in this draft; they rejoin `resolved`
    /// when their `@username` is typed again.
    #[serde(default)]
    pub known: Vec<MentionCandidate>,
}

/// Request body for splicing a chosen suggestion into a draft.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyMentionRequest {
    #[serde(flatten)]
    pub draft: ComposeDraft,
    pub selected: MentionCandidate,
}

/// Draft after an apply or sync, plus the open token at the caret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeUpdate {
    pub text: String,
    pub caret: usize,
    pub resolved: Vec<MentionCandidate>,
    pub known: Vec<MentionCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_token: Option<String>,
    /// Candidates for the open token; empty hides the list.
    pub suggestions: Vec<MentionCandidate>,
}

/// Request body for a committed-mention scan.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mention_input_accepts_both_shapes() {
        let names: MentionInput = serde_json::from_str(r#"["alice","bob"]"#).unwrap();
        assert_eq!(names.into_usernames(), vec!["alice", "bob"]);

        let candidates: MentionInput = serde_json::from_str(
            r#"[{"id":"1","username":"alice","displayName":"Alice"}]"#,
        )
        .unwrap();
        assert!(matches!(candidates, MentionInput::Candidates(_)));
        assert_eq!(candidates.into_usernames(), vec!["alice"]);
    }

    #[test]
    fn test_usernames_are_deduplicated_in_order() {
        let input = MentionInput::Usernames(vec![
            "@bob".to_string(),
            "alice".to_string(),
            "Bob".to_string(),
            " ".to_string(),
        ]);
        assert_eq!(input.into_usernames(), vec!["bob", "alice"]);
    }

    #[test]
    fn test_assistant_predicates() {
        assert!(MentionCandidate::assistant().is_assistant());
        assert!(is_assistant_username("EduHive"));
        assert!(!is_assistant_identity("someone-else"));
    }

    #[test]
    fn test_assistant_allowed_only_in_comments() {
        assert!(ComposeContext::Comment.allows_assistant_mention());
        assert!(!ComposeContext::Reply.allows_assistant_mention());
        assert!(!ComposeContext::Post.allows_assistant_mention());
    }
}
