//! Profile and follow-graph endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, spawn_notification, success, ApiResult};
use crate::auth::ActingUser;
use crate::errors::AppError;
use crate::models::{
    CreateProfileRequest, NewNotification, NotificationKind, Profile, UpdateProfileRequest,
};
use crate::AppState;

/// GET /api/profiles - List all profiles.
pub async fn list_profiles(State(state): State<AppState>) -> ApiResult<Vec<Profile>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_profiles().await {
        Ok(profiles) => success(profiles, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/profiles/:id - Get a single profile.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_profile(&id).await {
        Ok(Some(profile)) => success(profile, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Profile {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/profiles/by-username/:username
pub async fn get_profile_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_profile_by_username(&username).await {
        Ok(Some(profile)) => success(profile, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("No profile named @{}", username)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/profiles - Create a new profile.
pub async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.display_name.trim().is_empty() {
        return error(
            AppError::Validation("Display name is required".to_string()),
            revision_id,
        );
    }

    match state.repo.create_profile(&request).await {
        Ok(profile) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(profile, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/profiles/:id - Update the acting user's own profile.
pub async fn update_profile(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if user.id() != id {
        return error(
            AppError::Forbidden("Profiles can only be edited by their owner".to_string()),
            revision_id,
        );
    }

    match state.repo.update_profile(&id, &request).await {
        Ok(profile) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(profile, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/profiles/:id - Delete the acting user's own profile.
pub async fn delete_profile(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if user.id() != id {
        return error(
            AppError::Forbidden("Profiles can only be deleted by their owner".to_string()),
            revision_id,
        );
    }

    // Posts cascade with the profile; their ids are needed to clean the index.
    let authored = match state.repo.list_all_posts().await {
        Ok(posts) => posts
            .into_iter()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect::<Vec<_>>(),
        Err(e) => return error(e, revision_id),
    };

    match state.repo.delete_profile(&id).await {
        Ok(()) => {
            for post_id in &authored {
                if let Err(e) = state.search.remove_post(post_id).await {
                    tracing::warn!("Failed to remove post from index: {}", e);
                }
            }
            state.cache.invalidate_feed().await;
            state.cache.stats.clear().await;
            state.cache.unread.clear().await;

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/profiles/:id/follow - Follow a profile. Idempotent.
pub async fn follow_profile(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<bool> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.follow(user.id(), &id).await {
        Ok(created) => {
            if created {
                spawn_notification(
                    &state,
                    NewNotification {
                        recipient_user_id: id,
                        actor_user_id: user.id().to_string(),
                        kind: NotificationKind::Follow,
                        related_post_id: None,
                        related_comment_id: None,
                    },
                );
            }
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(created, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/profiles/:id/follow - Stop following a profile.
pub async fn unfollow_profile(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
) -> ApiResult<bool> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.unfollow(user.id(), &id).await {
        Ok(removed) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(removed, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/profiles/:id/following
pub async fn list_following(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Profile>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_following(&id).await {
        Ok(profiles) => success(profiles, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/profiles/:id/followers
pub async fn list_followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Profile>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_followers(&id).await {
        Ok(profiles) => success(profiles, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/profiles/:id/mutuals - Profiles following each other with `id`.
pub async fn list_mutuals(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Profile>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_mutuals(&id).await {
        Ok(profiles) => success(profiles, revision_id),
        Err(e) => error(e, revision_id),
    }
}
