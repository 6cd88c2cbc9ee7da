//! Suggests mention targets for a partially typed username.
//!
//! Only mutual follows are suggestible, plus the assistant where the
//! compose context allows it.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{is_assistant_identity, MentionCandidate, ASSISTANT_USERNAME};

/// Maximum number of suggestions returned for one token.
pub const MAX_SUGGESTIONS: usize = 8;

/// Read access to the follow graph.
#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Ids the user follows.
    async fn following(&self, user_id: &str) -> Result<Vec<String>, AppError>;

    /// Ids following the user.
    async fn followers(&self, user_id: &str) -> Result<Vec<String>, AppError>;

    /// Profiles among `ids` whose username contains `substring`
    /// (case-insensitive), at most `limit` rows, in storage order.
    async fn profiles_matching(
        &self,
        ids: &[String],
        substring: &str,
        limit: usize,
    ) -> Result<Vec<MentionCandidate>, AppError>;
}

/// Resolve suggestions for `partial`. Lookup failures yield an empty list.
pub async fn resolve_candidates(
    graph: &dyn SocialGraph,
    partial: &str,
    acting_user_id: &str,
    allow_assistant: bool,
) -> Vec<MentionCandidate> {
    match try_resolve(graph, partial, acting_user_id, allow_assistant).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(
                user_id = %acting_user_id,
                "Mention lookup failed, showing no suggestions: {}",
                e
            );
            Vec::new()
        }
    }
}

async fn try_resolve(
    graph: &dyn SocialGraph,
    partial: &str,
    acting_user_id: &str,
    allow_assistant: bool,
) -> Result<Vec<MentionCandidate>, AppError> {
    let needle = partial.to_lowercase();
    let mut out = Vec::with_capacity(MAX_SUGGESTIONS);

    if allow_assistant && ASSISTANT_USERNAME.to_lowercase().contains(&needle) {
        out.push(MentionCandidate::assistant());
    }

    let following = graph.following(acting_user_id).await?;
    let followers: HashSet<String> = graph.followers(acting_user_id).await?.into_iter().collect();

    let mutual: Vec<String> = following
        .into_iter()
        .filter(|id| followers.contains(id))
        .filter(|id| id != acting_user_id && !is_assistant_identity(id))
        .collect();

    let budget = MAX_SUGGESTIONS - out.len();
    if mutual.is_empty() || budget == 0 {
        return Ok(out);
    }

    let matches = graph.profiles_matching(&mutual, partial, budget).await?;
    out.extend(matches.into_iter().take(budget));

    tracing::debug!(
        user_id = %acting_user_id,
        token = %partial,
        count = out.len(),
        "Resolved mention suggestions"
    );
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory follow graph.
    #[derive(Default)]
    pub(crate) struct FakeGraph {
        pub profiles: Vec<MentionCandidate>,
        pub follows: Vec<(String, String)>,
        pub fail: bool,
    }

    impl FakeGraph {
        pub(crate) fn with_users(names: &[&str]) -> Self {
            let profiles = names
                .iter()
                .map(|n| MentionCandidate {
                    id: format!("id-{}", n),
                    username: n.to_string(),
                    display_name: n.to_uppercase(),
                    avatar_url: None,
                })
                .collect();
            Self {
                profiles,
                ..Default::default()
            }
        }

        pub(crate) fn follow(mut self, from: &str, to: &str) -> Self {
            self.follows
                .push((format!("id-{}", from), format!("id-{}", to)));
            self
        }

        pub(crate) fn mutual(self, a: &str, b: &str) -> Self {
            self.follow(a, b).follow(b, a)
        }
    }

    #[async_trait]
    impl SocialGraph for FakeGraph {
        async fn following(&self, user_id: &str) -> Result<Vec<String>, AppError> {
            if self.fail {
                return Err(AppError::Database("graph offline".to_string()));
            }
            Ok(self
                .follows
                .iter()
                .filter(|(from, _)| from == user_id)
                .map(|(_, to)| to.clone())
                .collect())
        }

        async fn followers(&self, user_id: &str) -> Result<Vec<String>, AppError> {
            Ok(self
                .follows
                .iter()
                .filter(|(_, to)| to == user_id)
                .map(|(from, _)| from.clone())
                .collect())
        }

        async fn profiles_matching(
            &self,
            ids: &[String],
            substring: &str,
            limit: usize,
        ) -> Result<Vec<MentionCandidate>, AppError> {
            let wanted: HashSet<&str> = ids.iter().map(|i| i.as_str()).collect();
            let needle = substring.to_lowercase();
            Ok(self
                .profiles
                .iter()
                .filter(|p| wanted.contains(p.id.as_str()))
                .filter(|p| p.username.to_lowercase().contains(&needle))
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn usernames(list: &[MentionCandidate]) -> Vec<&str> {
        list.iter().map(|c| c.username.as_str()).collect()
    }

    #[tokio::test]
    async fn test_only_mutual_follows_are_suggested() {
        let graph = FakeGraph::with_users(&["me", "alice", "adam", "amber"])
            .mutual("me", "alice")
            .mutual("me", "adam")
            .follow("me", "amber");

        let found = resolve_candidates(&graph, "a", "id-me", false).await;
        assert_eq!(usernames(&found), vec!["alice", "adam"]);
    }

    #[tokio::test]
    async fn test_assistant_prepended_when_allowed() {
        let graph = FakeGraph::with_users(&["me", "eddie"]).mutual("me", "eddie");

        let found = resolve_candidates(&graph, "ed", "id-me", true).await;
        assert_eq!(usernames(&found), vec![ASSISTANT_USERNAME, "eddie"]);

        let found = resolve_candidates(&graph, "ed", "id-me", false).await;
        assert_eq!(usernames(&found), vec!["eddie"]);
    }

    #[tokio::test]
    async fn test_empty_token_offers_assistant_and_connections() {
        let graph = FakeGraph::with_users(&["me", "zed"]).mutual("me", "zed");
        let found = resolve_candidates(&graph, "", "id-me", true).await;
        assert_eq!(usernames(&found), vec![ASSISTANT_USERNAME, "zed"]);
    }

    #[tokio::test]
    async fn test_case_insensitive_match() {
        let graph = FakeGraph::with_users(&["me", "BigAl"]).mutual("me", "BigAl");
        let found = resolve_candidates(&graph, "gal", "id-me", false).await;
        assert_eq!(usernames(&found), vec!["BigAl"]);
    }

    #[tokio::test]
    async fn test_results_are_capped() {
        let names: Vec<String> = (0..12).map(|i| format!("user{}", i)).collect();
        let mut all: Vec<&str> = vec!["me"];
        all.extend(names.iter().map(|s| s.as_str()));
        let mut graph = FakeGraph::with_users(&all);
        for n in &names {
            graph = graph.mutual("me", n);
        }

        let found = resolve_candidates(&graph, "user", "id-me", false).await;
        assert_eq!(found.len(), MAX_SUGGESTIONS);

        let found = resolve_candidates(&graph, "", "id-me", true).await;
        assert_eq!(found.len(), MAX_SUGGESTIONS);
        assert!(found[0].is_assistant());
    }

    #[tokio::test]
    async fn test_unknown_user_yields_nothing() {
        let graph = FakeGraph::with_users(&["me", "alice"]).mutual("me", "alice");
        let found = resolve_candidates(&graph, "nonexistentuser", "id-me", true).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_swallowed() {
        let mut graph = FakeGraph::with_users(&["me", "alice"]).mutual("me", "alice");
        graph.fail = true;
        let found = resolve_candidates(&graph, "", "id-me", true).await;
        assert!(found.is_empty());
    }
}
