//! Notification storage and the server side of mention fan-out.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::Repository;
use crate::errors::AppError;
use crate::fanout::{FanOutRequest, NotificationFanOut};
use crate::models::{
    is_assistant_identity, NewNotification, Notification, NotificationKind, ASSISTANT_USER_ID,
};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, actor_id, kind, post_id, comment_id, message, read, created_at";

impl Repository {
    /// Newest notifications for a user.
    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE recipient_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS unread FROM notifications WHERE recipient_id = ? AND read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("unread"))
    }

    /// Mark one of the user's notifications read.
    pub async fn mark_read(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND recipient_id = ?")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Mark everything read. Returns how many rows changed.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE notifications SET read = 1 WHERE recipient_id = ? AND read = 0")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() > 0 {
            self.increment_revision().await?;
        }
        Ok(result.rows_affected())
    }

    /// Insert one notification. Self-notifications and notifications to the
    /// assistant are dropped; returns whether a row was written.
    pub async fn insert_notification(&self, new: &NewNotification) -> Result<bool, AppError> {
        if new.recipient_user_id == new.actor_user_id
            || is_assistant_identity(&new.recipient_user_id)
        {
            return Ok(false);
        }

        let actor = self.actor_username(&new.actor_user_id).await?;
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut conn, new, &new.kind.message(&actor)).await?;

        self.increment_revision().await?;
        Ok(true)
    }

    async fn actor_username(&self, actor_id: &str) -> Result<String, AppError> {
        self.get_profile(actor_id)
            .await?
            .map(|p| p.username)
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", actor_id)))
    }

    /// Profile ids for the given usernames, matched case-insensitively.
    async fn recipient_ids(&self, usernames: &[String]) -> Result<Vec<String>, AppError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM profiles WHERE username IN (");
        let mut separated = builder.separated(", ");
        for name in usernames {
            separated.push_bind(name);
        }
        separated.push_unseparated(") ORDER BY created_at, rowid");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }
}

#[async_trait]
impl NotificationFanOut for Repository {
    async fn fan_out(&self, request: &FanOutRequest) -> Result<usize, AppError> {
        let actor = self.actor_username(&request.actor_user_id).await?;
        let message = NotificationKind::Mention.message(&actor);

        let recipients: Vec<String> = self
            .recipient_ids(&request.usernames)
            .await?
            .into_iter()
            .filter(|id| id != &request.actor_user_id && id != ASSISTANT_USER_ID)
            .collect();

        if recipients.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for recipient in &recipients {
            let row = NewNotification {
                recipient_user_id: recipient.clone(),
                actor_user_id: request.actor_user_id.clone(),
                kind: NotificationKind::Mention,
                related_post_id: request.post_id.clone(),
                related_comment_id: request.comment_id.clone(),
            };
            insert_row(&mut *tx, &row, &message).await?;
        }
        tx.commit().await?;

        self.increment_revision().await?;
        Ok(recipients.len())
    }

    async fn notify(&self, notification: &NewNotification) -> Result<(), AppError> {
        self.insert_notification(notification).await.map(|_| ())
    }
}

async fn insert_row(
    conn: &mut SqliteConnection,
    new: &NewNotification,
    message: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO notifications (id, recipient_id, actor_id, kind, post_id, comment_id, message, read, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)"
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&new.recipient_user_id)
    .bind(&new.actor_user_id)
    .bind(new.kind.as_str())
    .bind(&new.related_post_id)
    .bind(&new.related_comment_id)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn notification_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Notification, AppError> {
    let kind: String = row.get("kind");
    let read: i64 = row.get("read");
    Ok(Notification {
        id: row.get("id"),
        recipient_user_id: row.get("recipient_id"),
        actor_user_id: row.get("actor_id"),
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown notification kind: {}", kind)))?,
        related_post_id: row.get("post_id"),
        related_comment_id: row.get("comment_id"),
        message: row.get("message"),
        read: read != 0,
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::tests::{profile, test_repo};
    use crate::fanout::{fan_out_mentions, FanOutOutcome};
    use crate::models::MentionInput;

    #[tokio::test]
    async fn test_fan_out_notifies_each_mentioned_user() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let bob = profile(&repo, "bob").await;
        let carol = profile(&repo, "carol").await;
        let post = repo.create_post(&alice.id, "hi @bob @carol", &[], &[]).await.unwrap();

        let outcome = fan_out_mentions(
            &repo,
            MentionInput::Usernames(vec!["bob".to_string(), "carol".to_string()]),
            &alice.id,
            Some(&post.id),
            None,
        )
        .await;
        assert_eq!(outcome, FanOutOutcome::Sent { recipients: 2 });

        for user in [&bob, &carol] {
            let list = repo.list_notifications(&user.id, 50).await.unwrap();
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].kind, NotificationKind::Mention);
            assert_eq!(list[0].actor_user_id, alice.id);
            assert_eq!(list[0].related_post_id.as_deref(), Some(post.id.as_str()));
            assert_eq!(list[0].message, "@alice mentioned you");
            assert!(!list[0].read);
        }
        assert!(repo.list_notifications(&alice.id, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_skips_self_unknown_and_assistant() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let bob = profile(&repo, "bob").await;

        let request = FanOutRequest {
            usernames: vec![
                "ALICE".to_string(),
                "Bob".to_string(),
                "ghost".to_string(),
                "eduhive".to_string(),
            ],
            actor_user_id: alice.id.clone(),
            post_id: None,
            comment_id: None,
        };
        assert_eq!(repo.fan_out(&request).await.unwrap(), 1);
        assert_eq!(repo.unread_count(&bob.id).await.unwrap(), 1);
        assert_eq!(repo.unread_count(&alice.id).await.unwrap(), 0);
        assert_eq!(repo.unread_count(ASSISTANT_USER_ID).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notify_never_targets_actor() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;

        let written = repo
            .insert_notification(&NewNotification {
                recipient_user_id: alice.id.clone(),
                actor_user_id: alice.id.clone(),
                kind: NotificationKind::Like,
                related_post_id: None,
                related_comment_id: None,
            })
            .await
            .unwrap();
        assert!(!written);
        assert_eq!(repo.unread_count(&alice.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let bob = profile(&repo, "bob").await;

        for kind in [NotificationKind::Follow, NotificationKind::Like] {
            repo.insert_notification(&NewNotification {
                recipient_user_id: bob.id.clone(),
                actor_user_id: alice.id.clone(),
                kind,
                related_post_id: None,
                related_comment_id: None,
            })
            .await
            .unwrap();
        }
        assert_eq!(repo.unread_count(&bob.id).await.unwrap(), 2);

        let first = repo.list_notifications(&bob.id, 50).await.unwrap()[0].id.clone();
        assert!(matches!(
            repo.mark_read(&first, &alice.id).await,
            Err(AppError::NotFound(_))
        ));
        repo.mark_read(&first, &bob.id).await.unwrap();
        assert_eq!(repo.unread_count(&bob.id).await.unwrap(), 1);

        assert_eq!(repo.mark_all_read(&bob.id).await.unwrap(), 1);
        assert_eq!(repo.unread_count(&bob.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deleting_profile_removes_its_notifications() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let bob = profile(&repo, "bob").await;

        repo.insert_notification(&NewNotification {
            recipient_user_id: bob.id.clone(),
            actor_user_id: alice.id.clone(),
            kind: NotificationKind::Follow,
            related_post_id: None,
            related_comment_id: None,
        })
        .await
        .unwrap();

        repo.delete_profile(&alice.id).await.unwrap();
        assert_eq!(repo.unread_count(&bob.id).await.unwrap(), 0);
    }
}
