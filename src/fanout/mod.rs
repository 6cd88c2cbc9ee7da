//! Notification fan-out.
//!
//! Runs after the originating post or comment is stored. Everything here is
//! best-effort: failures are logged and never reach the author.

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{is_assistant_identity, is_assistant_username, MentionInput, NewNotification};

/// One mention fan-out call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FanOutRequest {
    pub usernames: Vec<String>,
    pub actor_user_id: String,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
}

/// Server side of the fan-out contract.
#[async_trait]
pub trait NotificationFanOut: Send + Sync {
    /// Resolve usernames and insert one mention notification per recipient.
    /// Returns the number of notifications written.
    async fn fan_out(&self, request: &FanOutRequest) -> Result<usize, AppError>;

    /// Insert a single like/comment/reply/follow notification.
    async fn notify(&self, notification: &NewNotification) -> Result<(), AppError>;
}

/// Result of a fan-out attempt, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutOutcome {
    /// Nothing to send after filtering.
    Skipped,
    Sent { recipients: usize },
    Failed,
}

/// Notify everyone mentioned in a freshly created post or comment.
///
/// The assistant is filtered out; an empty list makes no call at all.
pub async fn fan_out_mentions(
    sink: &dyn NotificationFanOut,
    mentions: MentionInput,
    actor_user_id: &str,
    post_id: Option<&str>,
    comment_id: Option<&str>,
) -> FanOutOutcome {
    let usernames: Vec<String> = mentions
        .into_usernames()
        .into_iter()
        .filter(|name| !is_assistant_username(name))
        .collect();

    if usernames.is_empty() {
        return FanOutOutcome::Skipped;
    }

    let request = FanOutRequest {
        usernames,
        actor_user_id: actor_user_id.to_string(),
        post_id: post_id.map(str::to_string),
        comment_id: comment_id.map(str::to_string),
    };

    match sink.fan_out(&request).await {
        Ok(recipients) => {
            tracing::info!(
                actor = %actor_user_id,
                mentioned = request.usernames.len(),
                recipients,
                "Mention notifications fanned out"
            );
            FanOutOutcome::Sent { recipients }
        }
        Err(e) => {
            tracing::warn!(
                actor = %actor_user_id,
                post_id = ?request.post_id,
                comment_id = ?request.comment_id,
                "Mention fan-out failed, notifications dropped: {}",
                e
            );
            FanOutOutcome::Failed
        }
    }
}

/// Send one direct notification, skipping self-actions and the assistant.
pub async fn notify_best_effort(sink: &dyn NotificationFanOut, notification: NewNotification) {
    if notification.recipient_user_id == notification.actor_user_id
        || is_assistant_identity(&notification.recipient_user_id)
    {
        return;
    }

    if let Err(e) = sink.notify(&notification).await {
        tracing::warn!(
            kind = notification.kind.as_str(),
            recipient = %notification.recipient_user_id,
            "Failed to write notification: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MentionCandidate, NotificationKind};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<FanOutRequest>>,
        direct: Mutex<Vec<NewNotification>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationFanOut for RecordingSink {
        async fn fan_out(&self, request: &FanOutRequest) -> Result<usize, AppError> {
            self.calls.lock().await.push(request.clone());
            if self.fail {
                return Err(AppError::Database("connection reset".to_string()));
            }
            Ok(request.usernames.len())
        }

        async fn notify(&self, notification: &NewNotification) -> Result<(), AppError> {
            self.direct.lock().await.push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_assistant_only_mention_makes_no_call() {
        let sink = RecordingSink::default();
        let outcome = fan_out_mentions(
            &sink,
            MentionInput::Candidates(vec![MentionCandidate::assistant()]),
            "actor",
            None,
            Some("c1"),
        )
        .await;

        assert_eq!(outcome, FanOutOutcome::Skipped);
        assert!(sink.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_single_call_with_all_usernames() {
        let sink = RecordingSink::default();
        let outcome = fan_out_mentions(
            &sink,
            MentionInput::Usernames(vec![
                "alice".to_string(),
                "eduhive".to_string(),
                "bob".to_string(),
            ]),
            "actor",
            Some("p1"),
            None,
        )
        .await;

        assert_eq!(outcome, FanOutOutcome::Sent { recipients: 2 });
        let calls = sink.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].usernames, vec!["alice", "bob"]);
        assert_eq!(calls[0].post_id.as_deref(), Some("p1"));
        assert_eq!(calls[0].comment_id, None);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let outcome = fan_out_mentions(
            &sink,
            MentionInput::Usernames(vec!["alice".to_string()]),
            "actor",
            Some("p1"),
            None,
        )
        .await;
        assert_eq!(outcome, FanOutOutcome::Failed);
    }

    #[tokio::test]
    async fn test_self_notifications_are_skipped() {
        let sink = RecordingSink::default();
        notify_best_effort(
            &sink,
            NewNotification {
                recipient_user_id: "u1".to_string(),
                actor_user_id: "u1".to_string(),
                kind: NotificationKind::Like,
                related_post_id: Some("p1".to_string()),
                related_comment_id: None,
            },
        )
        .await;
        notify_best_effort(
            &sink,
            NewNotification {
                recipient_user_id: "u2".to_string(),
                actor_user_id: "u1".to_string(),
                kind: NotificationKind::Like,
                related_post_id: Some("p1".to_string()),
                related_comment_id: None,
            },
        )
        .await;

        assert_eq!(sink.direct.lock().await.len(), 1);
    }
}
