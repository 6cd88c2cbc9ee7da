//! Database repository: revision tracking, profiles and the follow graph.
//!
//! Content and notification operations live in sibling modules as further
//! `impl Repository` blocks.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::errors::AppError;
use crate::mentions::{is_valid_username, SocialGraph};
use crate::models::{
    is_assistant_identity, is_assistant_username, CreateProfileRequest, MentionCandidate, Profile,
    RevisionInfo, UpdateProfileRequest,
};

const PROFILE_COLUMNS: &str =
    "id, username, display_name, avatar_url, bio, created_at, updated_at, version";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    // ==================== PROFILE OPERATIONS ====================

    /// List all profiles except the assistant.
    pub async fn list_profiles(&self) -> Result<Vec<Profile>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE id != ? ORDER BY username",
            PROFILE_COLUMNS
        ))
        .bind(crate::models::ASSISTANT_USER_ID)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    /// Get a profile by ID.
    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    /// Get a profile by username (case-insensitive).
    pub async fn get_profile_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Profile>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE username = ? COLLATE NOCASE",
            PROFILE_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    /// Create a new profile.
    pub async fn create_profile(&self, request: &CreateProfileRequest) -> Result<Profile, AppError> {
        let username = request.username.trim();
        if !is_valid_username(username) {
            return Err(AppError::Validation(
                "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
            ));
        }
        if is_assistant_username(username) {
            return Err(AppError::Validation(format!(
                "Username {} is reserved",
                username
            )));
        }
        if self.get_profile_by_username(username).await?.is_some() {
            return Err(AppError::Validation(format!(
                "Username {} is already taken",
                username
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO profiles (id, username, display_name, avatar_url, bio, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, 1)"
        )
        .bind(&id)
        .bind(username)
        .bind(&request.display_name)
        .bind(&request.avatar_url)
        .bind(&request.bio)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Profile {
            id,
            username: username.to_string(),
            display_name: request.display_name.clone(),
            avatar_url: request.avatar_url.clone(),
            bio: request.bio.clone(),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Update a profile with optimistic concurrency control.
    pub async fn update_profile(
        &self,
        id: &str,
        request: &UpdateProfileRequest,
    ) -> Result<Profile, AppError> {
        let existing = self
            .get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))?;

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

        let display_name = request
            .display_name
            .as_ref()
            .unwrap_or(&existing.display_name);
        let avatar_url = request.avatar_url.clone().or(existing.avatar_url.clone());
        let bio = request.bio.clone().or(existing.bio.clone());

        // Use conditional UPDATE with version check to prevent race conditions
        let result = sqlx::query(
            "UPDATE profiles SET display_name = ?, avatar_url = ?, bio = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?"
        )
        .bind(display_name)
        .bind(&avatar_url)
        .bind(&bio)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Race condition - version changed between read and write
            let current = self.get_profile(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|p| p.version).unwrap_or(0),
            });
        }

        self.increment_revision().await?;

        Ok(Profile {
            id: id.to_string(),
            username: existing.username,
            display_name: display_name.clone(),
            avatar_url,
            bio,
            created_at: existing.created_at,
            updated_at: now,
            version: new_version,
        })
    }

    /// Delete a profile and everything it owns.
    pub async fn delete_profile(&self, id: &str) -> Result<(), AppError> {
        if is_assistant_identity(id) {
            return Err(AppError::Forbidden(
                "The assistant profile cannot be deleted".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        // Notifications about the user's content from third parties would
        // otherwise outlive it.
        sqlx::query(
            r#"DELETE FROM notifications
               WHERE post_id IN (SELECT id FROM posts WHERE author_id = ?1)
                  OR comment_id IN (
                      SELECT c.id FROM comments c
                      WHERE c.author_id = ?1
                         OR c.post_id IN (SELECT id FROM posts WHERE author_id = ?1)
                  )"#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Profile {} not found", id)));
        }

        tx.commit().await?;

        self.increment_revision().await?;
        Ok(())
    }

    // ==================== FOLLOW OPERATIONS ====================

    /// Follow `followee_id`. Returns false if already following.
    pub async fn follow(&self, follower_id: &str, followee_id: &str) -> Result<bool, AppError> {
        if follower_id == followee_id {
            return Err(AppError::Validation("You cannot follow yourself".to_string()));
        }
        if self.get_profile(followee_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Profile {} not found",
                followee_id
            )));
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(follower_id)
        .bind(followee_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            self.increment_revision().await?;
        }
        Ok(inserted)
    }

    /// Unfollow `followee_id`. Returns false if not following.
    pub async fn unfollow(&self, follower_id: &str, followee_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            self.increment_revision().await?;
        }
        Ok(removed)
    }

    /// Profiles the user follows.
    pub async fn list_following(&self, user_id: &str) -> Result<Vec<Profile>, AppError> {
        let rows = sqlx::query(
            r#"SELECT p.id, p.username, p.display_name, p.avatar_url, p.bio, p.created_at, p.updated_at, p.version
               FROM follows f JOIN profiles p ON p.id = f.followee_id
               WHERE f.follower_id = ?
               ORDER BY f.created_at"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    /// Profiles following the user.
    pub async fn list_followers(&self, user_id: &str) -> Result<Vec<Profile>, AppError> {
        let rows = sqlx::query(
            r#"SELECT p.id, p.username, p.display_name, p.avatar_url, p.bio, p.created_at, p.updated_at, p.version
               FROM follows f JOIN profiles p ON p.id = f.follower_id
               WHERE f.followee_id = ?
               ORDER BY f.created_at"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    /// Profiles that follow the user back. These are the mention candidates.
    pub async fn list_mutuals(&self, user_id: &str) -> Result<Vec<Profile>, AppError> {
        let rows = sqlx::query(
            r#"SELECT p.id, p.username, p.display_name, p.avatar_url, p.bio, p.created_at, p.updated_at, p.version
               FROM follows f
               JOIN follows back ON back.follower_id = f.followee_id AND back.followee_id = f.follower_id
               JOIN profiles p ON p.id = f.followee_id
               WHERE f.follower_id = ?
               ORDER BY p.username"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(profile_from_row).collect())
    }
}

#[async_trait]
impl SocialGraph for Repository {
    async fn following(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT followee_id FROM follows WHERE follower_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("followee_id")).collect())
    }

    async fn followers(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT follower_id FROM follows WHERE followee_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("follower_id")).collect())
    }

    async fn profiles_matching(
        &self,
        ids: &[String],
        substring: &str,
        limit: usize,
    ) -> Result<Vec<MentionCandidate>, AppError> {
        if ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, username, display_name, avatar_url FROM profiles WHERE id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") AND instr(lower(username), lower(");
        query.push_bind(substring);
        query.push(")) > 0 ORDER BY created_at, rowid LIMIT ");
        query.push_bind(limit as i64);

        let rows = query.build().fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| MentionCandidate {
                id: row.get("id"),
                username: row.get("username"),
                display_name: row.get("display_name"),
                avatar_url: row.get("avatar_url"),
            })
            .collect())
    }
}

// Helper functions for row conversion

pub(super) fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Profile {
    Profile {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        bio: row.get("bio"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

pub(super) fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
