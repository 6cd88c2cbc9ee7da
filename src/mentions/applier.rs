//! Splices chosen suggestions into draft text and keeps the resolved
//! mention set in step with what the text actually says.

use indexmap::IndexMap;

use super::scanner::{committed_mentions, open_token};
use crate::models::{
    is_assistant_identity, is_assistant_username, ComposeContext, MentionCandidate,
    ASSISTANT_USERNAME,
};

/// Per-draft mapping of username to resolved candidate, in insertion order.
///
/// Every key appears as `@key` in the draft after each [`sync`](Self::sync);
/// the assistant is only ever present when the context allows it.
/// Everything ever resolved in the draft is also remembered in `known`, so
/// a mention that was deleted and typed again rejoins the set.
#[derive(Debug, Clone)]
pub struct ResolvedMentionSet {
    context: ComposeContext,
    entries: IndexMap<String, MentionCandidate>,
    known: IndexMap<String, MentionCandidate>,
}

impl ResolvedMentionSet {
    pub fn new(context: ComposeContext) -> Self {
        Self {
            context,
            entries: IndexMap::new(),
            known: IndexMap::new(),
        }
    }

    /// Rebuild a set from candidates a client sent back.
    pub fn from_candidates(
        context: ComposeContext,
        candidates: impl IntoIterator<Item = MentionCandidate>,
    ) -> Self {
        let mut set = Self::new(context);
        for candidate in candidates {
            set.insert(candidate);
        }
        set
    }

    /// Remember candidates resolved earlier in the draft without adding
    /// them to the current set.
    pub fn remember(&mut self, candidates: impl IntoIterator<Item = MentionCandidate>) {
        for candidate in candidates {
            if self.admissible(&candidate) {
                self.known.insert(candidate.username.clone(), candidate);
            }
        }
    }

    pub fn context(&self) -> ComposeContext {
        self.context
    }

    /// Insert or refresh a candidate; a re-selected username moves to the end.
    pub fn insert(&mut self, candidate: MentionCandidate) -> bool {
        if !self.admissible(&candidate) {
            return false;
        }
        self.known.insert(candidate.username.clone(), candidate.clone());
        self.entries.shift_remove(&candidate.username);
        self.entries.insert(candidate.username.clone(), candidate);
        true
    }

    /// The assistant id and username must agree, and the assistant needs a
    /// context that allows it.
    fn admissible(&self, candidate: &MentionCandidate) -> bool {
        let by_id = is_assistant_identity(&candidate.id);
        if by_id != is_assistant_username(&candidate.username) {
            return false;
        }
        !by_id || self.context.allows_assistant_mention()
    }

    pub fn get(&self, username: &str) -> Option<&MentionCandidate> {
        self.entries.get(username)
    }

    pub fn contains_assistant(&self) -> bool {
        self.entries.values().any(MentionCandidate::is_assistant)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn to_candidates(&self) -> Vec<MentionCandidate> {
        self.entries.values().cloned().collect()
    }

    pub fn into_candidates(self) -> Vec<MentionCandidate> {
        self.entries.into_values().collect()
    }

    /// Every candidate resolved so far, including ones no longer in the text.
    pub fn known_candidates(&self) -> Vec<MentionCandidate> {
        self.known.values().cloned().collect()
    }

    /// Reconcile with the current draft text.
    ///
    /// Entries whose `@username` no longer appears are dropped. A mention
    /// typed again rejoins from `known`; a manually typed assistant mention
    /// is admitted if the context allows it.
    pub fn sync(&mut self, text: &str) {
        let present = committed_mentions(text);
        self.entries
            .retain(|username, _| present.iter().any(|p| p == username));

        for username in &present {
            if self.entries.contains_key(username) {
                continue;
            }
            if let Some(candidate) = self.known.get(username) {
                self.entries.insert(username.clone(), candidate.clone());
            } else if username == ASSISTANT_USERNAME && self.context.allows_assistant_mention() {
                let assistant = MentionCandidate::assistant();
                self.known.insert(username.clone(), assistant.clone());
                self.entries.insert(username.clone(), assistant);
            }
        }
    }
}

/// Text and caret after a suggestion was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMention {
    pub text: String,
    pub caret: usize,
}

/// Replace the open token at `caret` with `@{username} `.
///
/// With no open token the mention is inserted at the caret. The caret ends
/// up right after the inserted space and `resolved` gains the candidate.
pub fn apply_mention(
    resolved: &mut ResolvedMentionSet,
    selected: MentionCandidate,
    text: &str,
    caret: usize,
) -> AppliedMention {
    let chars: Vec<char> = text.chars().collect();
    let caret = caret.min(chars.len());
    let start = open_token(text, caret).map_or(caret, |t| t.start);

    let inserted = format!("@{} ", selected.username);
    let mut out: String = chars[..start].iter().collect();
    out.push_str(&inserted);
    out.extend(&chars[caret..]);

    let new_caret = start + inserted.chars().count();

    resolved.insert(selected);
    resolved.sync(&out);

    AppliedMention {
        text: out,
        caret: new_caret,
    }
}
