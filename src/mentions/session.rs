//! Compose session: one draft's text, caret, resolved mentions and
//! suggestion state, from the first keystroke to submission.

use super::applier::{apply_mention, ResolvedMentionSet};
use super::resolver::{resolve_candidates, SocialGraph};
use super::scanner::{committed_mentions, open_token};
use crate::models::{
    ComposeContext, ComposeDraft, MentionCandidate, MentionInput, ASSISTANT_USERNAME,
};

/// Lifecycle of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeState {
    Idle,
    Typing,
    SuggestionsShown,
    Committed,
    Submitted,
}

/// Identifies one suggestion lookup. Only the newest ticket's results are
/// accepted, so a slow response can't overwrite a fresher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupTicket(u64);

/// A lookup the caller should perform for the token at the caret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLookup {
    pub ticket: LookupTicket,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct ComposeSession {
    text: String,
    caret: usize,
    resolved: ResolvedMentionSet,
    suggestions: Vec<MentionCandidate>,
    state: ComposeState,
    issued: u64,
}

impl ComposeSession {
    pub fn new(context: ComposeContext) -> Self {
        Self {
            text: String::new(),
            caret: 0,
            resolved: ResolvedMentionSet::new(context),
            suggestions: Vec::new(),
            state: ComposeState::Idle,
            issued: 0,
        }
    }

    /// Resume a draft a client sent back, reconciling its mentions with its text.
    pub fn restore(draft: ComposeDraft) -> Self {
        let mut resolved = ResolvedMentionSet::from_candidates(draft.context, draft.resolved);
        resolved.remember(draft.known);
        resolved.sync(&draft.text);
        Self {
            caret: draft.caret,
            text: draft.text,
            resolved,
            suggestions: Vec::new(),
            state: ComposeState::Typing,
            issued: 0,
        }
    }

    pub fn state(&self) -> ComposeState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn resolved(&self) -> &ResolvedMentionSet {
        &self.resolved
    }

    pub fn suggestions(&self) -> &[MentionCandidate] {
        &self.suggestions
    }

    pub fn show_suggestions(&self) -> bool {
        !self.suggestions.is_empty()
    }

    /// The open mention token at the caret, if any.
    pub fn open_token(&self) -> Option<String> {
        open_token(&self.text, self.caret).map(|t| t.token)
    }

    /// Record a text change. Returns the lookup to run when the caret is
    /// inside an open mention; otherwise suggestions are hidden.
    pub fn edit(&mut self, text: impl Into<String>, caret: usize) -> Option<PendingLookup> {
        self.text = text.into();
        self.caret = caret;
        self.resolved.sync(&self.text);
        self.state = ComposeState::Typing;

        // Any newer edit supersedes lookups still in flight.
        self.issued += 1;
        let ticket = LookupTicket(self.issued);

        match open_token(&self.text, self.caret) {
            Some(open) => Some(PendingLookup {
                ticket,
                token: open.token,
            }),
            None => {
                self.suggestions.clear();
                None
            }
        }
    }

    /// Accept lookup results. Returns false (and changes nothing) for a stale ticket.
    pub fn accept_suggestions(
        &mut self,
        ticket: LookupTicket,
        suggestions: Vec<MentionCandidate>,
    ) -> bool {
        if ticket.0 != self.issued {
            tracing::debug!(
                ticket = ticket.0,
                latest = self.issued,
                "Discarding stale mention suggestions"
            );
            return false;
        }
        self.suggestions = suggestions;
        self.state = if self.suggestions.is_empty() {
            ComposeState::Typing
        } else {
            ComposeState::SuggestionsShown
        };
        true
    }

    /// Edit, then resolve suggestions for the token at the caret.
    pub async fn edit_and_resolve(
        &mut self,
        graph: &dyn SocialGraph,
        acting_user_id: &str,
        text: impl Into<String>,
        caret: usize,
    ) -> &[MentionCandidate] {
        if let Some(lookup) = self.edit(text, caret) {
            let allow = self.resolved.context().allows_assistant_mention();
            let found = resolve_candidates(graph, &lookup.token, acting_user_id, allow).await;
            self.accept_suggestions(lookup.ticket, found);
        }
        &self.suggestions
    }

    /// Splice a chosen suggestion in at the caret.
    pub fn select(&mut self, candidate: MentionCandidate) {
        let applied = apply_mention(&mut self.resolved, candidate, &self.text, self.caret);
        self.text = applied.text;
        self.caret = applied.caret;
        self.suggestions.clear();
        self.issued += 1;
        self.state = ComposeState::Committed;
    }

    /// Finish the draft.
    pub fn submit(mut self) -> SubmittedDraft {
        self.resolved.sync(&self.text);
        self.state = ComposeState::Submitted;
        let summon_assistant = self.resolved.contains_assistant();
        SubmittedDraft {
            text: self.text,
            mentions: MentionInput::Candidates(self.resolved.into_candidates()),
            summon_assistant,
        }
    }
}

/// What a submitted draft hands to fan-out and the assistant.
#[derive(Debug, Clone)]
pub struct SubmittedDraft {
    pub text: String,
    pub mentions: MentionInput,
    pub summon_assistant: bool,
}

/// Normalize the mentions attached to a create request.
///
/// Resolved candidates are reconciled with the final body; plain username
/// lists from older clients pass through; with nothing attached the body
/// is scanned so plain-text mentions still notify.
pub fn prepare_submission(
    context: ComposeContext,
    body: &str,
    mentions: Option<MentionInput>,
) -> SubmittedDraft {
    match mentions {
        Some(MentionInput::Candidates(candidates)) => {
            let caret = body.chars().count();
            ComposeSession::restore(ComposeDraft {
                context,
                text: body.to_string(),
                caret,
                resolved: candidates,
                known: Vec::new(),
            })
            .submit()
        }
        Some(MentionInput::Usernames(names)) => SubmittedDraft {
            text: body.to_string(),
            summon_assistant: context.allows_assistant_mention()
                && body_mentions_assistant(body),
            mentions: MentionInput::Usernames(names),
        },
        None => SubmittedDraft {
            text: body.to_string(),
            summon_assistant: context.allows_assistant_mention()
                && body_mentions_assistant(body),
            mentions: MentionInput::Usernames(committed_mentions(body)),
        },
    }
}

fn body_mentions_assistant(body: &str) -> bool {
    committed_mentions(body)
        .iter()
        .any(|name| name == ASSISTANT_USERNAME)
}
