//! Posts, comments, likes and bookmarks.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use super::repository::parse_json_array;
use super::Repository;
use crate::assistant::ContentStore;
use crate::errors::AppError;
use crate::models::{
    attachments_from_columns, attachments_to_columns, Attachment, Comment, NewComment, Post,
    PostStats, UpdatePostRequest,
};

const POST_SELECT: &str = r#"
    SELECT p.id, p.author_id, pr.username AS author_username, p.body, p.tags,
           p.attachment_url, p.attachment_type,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
           p.created_at, p.updated_at, p.version
    FROM posts p JOIN profiles pr ON pr.id = p.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.author_id, pr.username AS author_username, c.parent_id, c.body,
           c.attachment_url, c.attachment_type, c.created_at
    FROM comments c JOIN profiles pr ON pr.id = c.author_id
"#;

impl Repository {
    // ==================== POST OPERATIONS ====================

    /// Newest posts first.
    pub async fn list_feed(&self, limit: usize, offset: usize) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY p.created_at DESC, p.rowid DESC LIMIT ? OFFSET ?",
            POST_SELECT
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    /// Every post, for rebuilding the search index.
    pub async fn list_all_posts(&self) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query(&format!("{} ORDER BY p.created_at", POST_SELECT))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(post_from_row).collect())
    }

    /// Get a post by ID.
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let row = sqlx::query(&format!("{} WHERE p.id = ?", POST_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(post_from_row))
    }

    /// Create a new post.
    pub async fn create_post(
        &self,
        author_id: &str,
        body: &str,
        tags: &[String],
        attachments: &[Attachment],
    ) -> Result<Post, AppError> {
        let author = self
            .get_profile(author_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", author_id)))?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let tags_json = serde_json::to_string(tags)?;
        let (attachment_url, attachment_type) = attachments_to_columns(attachments);

        sqlx::query(
            "INSERT INTO posts (id, author_id, body, tags, attachment_url, attachment_type, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)"
        )
        .bind(&id)
        .bind(author_id)
        .bind(body)
        .bind(&tags_json)
        .bind(&attachment_url)
        .bind(&attachment_type)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Post {
            id,
            author_id: author.id,
            author_username: author.username,
            body: body.to_string(),
            tags: tags.to_vec(),
            attachments: attachments.to_vec(),
            like_count: 0,
            comment_count: 0,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Edit a post's body or tags. Only the author may edit.
    pub async fn update_post(
        &self,
        id: &str,
        actor_id: &str,
        request: &UpdatePostRequest,
    ) -> Result<Post, AppError> {
        let existing = self
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", id)))?;

        if existing.author_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the author can edit this post".to_string(),
            ));
        }

        // Check version for optimistic concurrency
        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;
        let body = request.body.clone().unwrap_or(existing.body.clone());
        let tags = request.tags.clone().unwrap_or(existing.tags.clone());
        let tags_json = serde_json::to_string(&tags)?;

        let result = sqlx::query(
            "UPDATE posts SET body = ?, tags = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&body)
        .bind(&tags_json)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_post(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|p| p.version).unwrap_or(0),
            });
        }

        self.increment_revision().await?;

        Ok(Post {
            body,
            tags,
            updated_at: now,
            version: new_version,
            ..existing
        })
    }

    /// Delete a post with its comments, likes, bookmarks and notifications.
    pub async fn delete_post(&self, id: &str, actor_id: &str) -> Result<(), AppError> {
        let existing = self
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", id)))?;

        if existing.author_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the author can delete this post".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"DELETE FROM notifications
               WHERE post_id = ?1
                  OR comment_id IN (SELECT id FROM comments WHERE post_id = ?1)"#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Comments, likes and bookmarks cascade.
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.increment_revision().await?;
        Ok(())
    }

    // ==================== LIKE / BOOKMARK OPERATIONS ====================

    /// Like or unlike a post. Returns the post's stats for `user_id` afterwards.
    pub async fn set_like(
        &self,
        post_id: &str,
        user_id: &str,
        liked: bool,
    ) -> Result<(PostStats, bool), AppError> {
        self.ensure_post_exists(post_id).await?;

        let result = if liked {
            sqlx::query("INSERT OR IGNORE INTO likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(user_id)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query("DELETE FROM likes WHERE post_id = ? AND user_id = ?")
                .bind(post_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
        };

        let changed = result.rows_affected() > 0;
        if changed {
            self.increment_revision().await?;
        }
        Ok((self.post_stats(post_id, user_id).await?, changed))
    }

    /// Bookmark or un-bookmark a post. Returns the stats afterwards.
    pub async fn set_bookmark(
        &self,
        post_id: &str,
        user_id: &str,
        bookmarked: bool,
    ) -> Result<PostStats, AppError> {
        self.ensure_post_exists(post_id).await?;

        if bookmarked {
            sqlx::query(
                "INSERT OR IGNORE INTO bookmarks (post_id, user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(post_id)
            .bind(user_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM bookmarks WHERE post_id = ? AND user_id = ?")
                .bind(post_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }

        self.post_stats(post_id, user_id).await
    }

    /// Like count plus the viewer's like and bookmark flags.
    pub async fn post_stats(&self, post_id: &str, viewer_id: &str) -> Result<PostStats, AppError> {
        let row = sqlx::query(
            r#"SELECT
                (SELECT COUNT(*) FROM likes WHERE post_id = ?1) AS like_count,
                EXISTS(SELECT 1 FROM likes WHERE post_id = ?1 AND user_id = ?2) AS liked,
                EXISTS(SELECT 1 FROM bookmarks WHERE post_id = ?1 AND user_id = ?2) AS bookmarked"#,
        )
        .bind(post_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        let liked: i64 = row.get("liked");
        let bookmarked: i64 = row.get("bookmarked");
        Ok(PostStats {
            like_count: row.get("like_count"),
            liked_by_viewer: liked != 0,
            bookmarked_by_viewer: bookmarked != 0,
        })
    }

    /// Posts the user bookmarked, most recent bookmark first.
    pub async fn list_bookmarks(&self, user_id: &str) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query(&format!(
            "{} JOIN bookmarks b ON b.post_id = p.id WHERE b.user_id = ? ORDER BY b.created_at DESC",
            POST_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(post_from_row).collect())
    }

    async fn ensure_post_exists(&self, post_id: &str) -> Result<(), AppError> {
        let exists = sqlx::query("SELECT 1 FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Post {} not found", post_id)))
        }
    }

    // ==================== COMMENT OPERATIONS ====================

    /// Comments and replies of a post, oldest first.
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, AppError> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.post_id = ? ORDER BY c.created_at, c.rowid",
            COMMENT_SELECT
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(comment_from_row).collect())
    }

    /// Get a comment by ID.
    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, AppError> {
        let row = sqlx::query(&format!("{} WHERE c.id = ?", COMMENT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(comment_from_row))
    }

    /// Insert a comment or reply.
    pub async fn insert_comment(&self, new_comment: &NewComment) -> Result<Comment, AppError> {
        self.ensure_post_exists(&new_comment.post_id).await?;

        if let Some(parent_id) = &new_comment.parent_id {
            let parent = self
                .get_comment(parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", parent_id)))?;
            if parent.post_id != new_comment.post_id {
                return Err(AppError::Validation(
                    "Reply must belong to the same post as its parent".to_string(),
                ));
            }
        }

        let author = self
            .get_profile(&new_comment.author_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Profile {} not found", new_comment.author_id))
            })?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let (attachment_url, attachment_type) = attachments_to_columns(&new_comment.attachments);

        sqlx::query(
            "INSERT INTO comments (id, post_id, author_id, parent_id, body, attachment_url, attachment_type, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(&new_comment.post_id)
        .bind(&new_comment.author_id)
        .bind(&new_comment.parent_id)
        .bind(&new_comment.body)
        .bind(&attachment_url)
        .bind(&attachment_type)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Comment {
            id,
            post_id: new_comment.post_id.clone(),
            author_id: author.id,
            author_username: author.username,
            parent_id: new_comment.parent_id.clone(),
            body: new_comment.body.clone(),
            attachments: new_comment.attachments.clone(),
            created_at: now,
        })
    }

    /// Delete a comment, its replies and their notifications. Only the author may delete.
    pub async fn delete_comment(&self, id: &str, actor_id: &str) -> Result<Comment, AppError> {
        let existing = self
            .get_comment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", id)))?;

        if existing.author_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the author can delete this comment".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let thread = comment_thread_ids(&mut *tx, id).await?;

        for comment_id in &thread {
            sqlx::query("DELETE FROM notifications WHERE comment_id = ?")
                .bind(comment_id)
                .execute(&mut *tx)
                .await?;
        }

        // Replies cascade through parent_id.
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.increment_revision().await?;
        Ok(existing)
    }
}

/// The comment and every reply beneath it.
async fn comment_thread_ids(
    conn: &mut SqliteConnection,
    root_id: &str,
) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query(
        r#"WITH RECURSIVE thread(id) AS (
               SELECT ?
               UNION ALL
               SELECT c.id FROM comments c JOIN thread t ON c.parent_id = t.id
           )
           SELECT id FROM thread"#,
    )
    .bind(root_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(|r| r.get("id")).collect())
}

#[async_trait]
impl ContentStore for Repository {
    async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        Repository::get_post(self, id).await
    }

    async fn create_comment(&self, new_comment: &NewComment) -> Result<Comment, AppError> {
        self.insert_comment(new_comment).await
    }
}

// Helper functions for row conversion

fn post_from_row(row: &sqlx::sqlite::SqliteRow) -> Post {
    let tags_str: Option<String> = row.get("tags");
    let attachment_url: Option<String> = row.get("attachment_url");
    let attachment_type: Option<String> = row.get("attachment_type");
    Post {
        id: row.get("id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        body: row.get("body"),
        tags: tags_str.map(|s| parse_json_array(&s)).unwrap_or_default(),
        attachments: attachments_from_columns(attachment_url.as_deref(), attachment_type.as_deref()),
        like_count: row.get("like_count"),
        comment_count: row.get("comment_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn comment_from_row(row: &sqlx::sqlite::SqliteRow) -> Comment {
    let attachment_url: Option<String> = row.get("attachment_url");
    let attachment_type: Option<String> = row.get("attachment_type");
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        parent_id: row.get("parent_id"),
        body: row.get("body"),
        attachments: attachments_from_columns(attachment_url.as_deref(), attachment_type.as_deref()),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::tests::{profile, test_repo};
    use crate::models::{NewNotification, NotificationKind};

    #[tokio::test]
    async fn test_post_roundtrip_with_attachments() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let attachments = vec![
            Attachment {
                url: "https://cdn/a.png".to_string(),
                content_type: "image/png".to_string(),
            },
            Attachment {
                url: "https://cdn/b.pdf".to_string(),
                content_type: "application/pdf".to_string(),
            },
        ];

        let post = repo
            .create_post(&alice.id, "Lecture notes", &["math".to_string()], &attachments)
            .await
            .unwrap();
        let loaded = repo.get_post(&post.id).await.unwrap().unwrap();

        assert_eq!(loaded.author_username, "alice");
        assert_eq!(loaded.tags, vec!["math"]);
        assert_eq!(loaded.attachments, attachments);
    }

    #[tokio::test]
    async fn test_only_owner_edits_and_deletes() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let bob = profile(&repo, "bob").await;
        let post = repo.create_post(&alice.id, "hi", &[], &[]).await.unwrap();

        let edit = UpdatePostRequest {
            body: Some("hello".to_string()),
            tags: None,
            expected_version: Some(1),
        };
        assert!(matches!(
            repo.update_post(&post.id, &bob.id, &edit).await,
            Err(AppError::Forbidden(_))
        ));
        let updated = repo.update_post(&post.id, &alice.id, &edit).await.unwrap();
        assert_eq!(updated.body, "hello");
        assert_eq!(updated.version, 2);

        assert!(matches!(
            repo.delete_post(&post.id, &bob.id).await,
            Err(AppError::Forbidden(_))
        ));
        repo.delete_post(&post.id, &alice.id).await.unwrap();
        assert!(repo.get_post(&post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_likes_are_idempotent() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let bob = profile(&repo, "bob").await;
        let post = repo.create_post(&alice.id, "hi", &[], &[]).await.unwrap();

        let (stats, changed) = repo.set_like(&post.id, &bob.id, true).await.unwrap();
        assert!(changed);
        assert_eq!(stats.like_count, 1);
        assert!(stats.liked_by_viewer);

        let (stats, changed) = repo.set_like(&post.id, &bob.id, true).await.unwrap();
        assert!(!changed);
        assert_eq!(stats.like_count, 1);

        let (stats, _) = repo.set_like(&post.id, &bob.id, false).await.unwrap();
        assert_eq!(stats.like_count, 0);
        assert!(!stats.liked_by_viewer);
    }

    #[tokio::test]
    async fn test_bookmarks() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let post = repo.create_post(&alice.id, "save me", &[], &[]).await.unwrap();

        let stats = repo.set_bookmark(&post.id, &alice.id, true).await.unwrap();
        assert!(stats.bookmarked_by_viewer);
        assert_eq!(repo.list_bookmarks(&alice.id).await.unwrap().len(), 1);

        repo.set_bookmark(&post.id, &alice.id, false).await.unwrap();
        assert!(repo.list_bookmarks(&alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_must_share_post() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let p1 = repo.create_post(&alice.id, "one", &[], &[]).await.unwrap();
        let p2 = repo.create_post(&alice.id, "two", &[], &[]).await.unwrap();
        let c1 = repo
            .insert_comment(&NewComment {
                post_id: p1.id.clone(),
                author_id: alice.id.clone(),
                parent_id: None,
                body: "first".to_string(),
                attachments: Vec::new(),
            })
            .await
            .unwrap();

        let err = repo
            .insert_comment(&NewComment {
                post_id: p2.id.clone(),
                author_id: alice.id.clone(),
                parent_id: Some(c1.id.clone()),
                body: "wrong thread".to_string(),
                attachments: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_deleting_post_prunes_notifications() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let bob = profile(&repo, "bob").await;
        let post = repo.create_post(&alice.id, "hi", &[], &[]).await.unwrap();
        let comment = repo
            .insert_comment(&NewComment {
                post_id: post.id.clone(),
                author_id: bob.id.clone(),
                parent_id: None,
                body: "nice".to_string(),
                attachments: Vec::new(),
            })
            .await
            .unwrap();

        repo.insert_notification(&NewNotification {
            recipient_user_id: alice.id.clone(),
            actor_user_id: bob.id.clone(),
            kind: NotificationKind::Comment,
            related_post_id: Some(post.id.clone()),
            related_comment_id: Some(comment.id.clone()),
        })
        .await
        .unwrap();
        assert_eq!(repo.list_notifications(&alice.id, 50).await.unwrap().len(), 1);

        repo.delete_post(&post.id, &alice.id).await.unwrap();
        assert!(repo.list_notifications(&alice.id, 50).await.unwrap().is_empty());
        assert!(repo.get_comment(&comment.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleting_comment_removes_replies() {
        let (repo, _dir) = test_repo().await;
        let alice = profile(&repo, "alice").await;
        let post = repo.create_post(&alice.id, "hi", &[], &[]).await.unwrap();
        let root = repo
            .insert_comment(&NewComment {
                post_id: post.id.clone(),
                author_id: alice.id.clone(),
                parent_id: None,
                body: "root".to_string(),
                attachments: Vec::new(),
            })
            .await
            .unwrap();
        let reply = repo
            .insert_comment(&NewComment {
                post_id: post.id.clone(),
                author_id: alice.id.clone(),
                parent_id: Some(root.id.clone()),
                body: "reply".to_string(),
                attachments: Vec::new(),
            })
            .await
            .unwrap();

        repo.delete_comment(&root.id, &alice.id).await.unwrap();
        assert!(repo.get_comment(&reply.id).await.unwrap().is_none());
        assert!(repo.list_comments(&post.id).await.unwrap().is_empty());
    }
}
