//! EduHive Backend
//!
//! REST backend for the EduHive student feed: posts, comments, the follow
//! graph, @mention resolution with notification fan-out, and the EduHive AI
//! assistant. SQLite persistence and Tantivy full-text search.

mod api;
mod assistant;
mod auth;
mod cache;
mod config;
mod db;
mod errors;
mod fanout;
mod mentions;
mod models;
mod optimistic;
mod search;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use assistant::LanguageModel;
use cache::AppCache;
use config::Config;
use db::Repository;
use fanout::NotificationFanOut;
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
    pub cache: Arc<AppCache>,
    /// Mention and activity notifications; the repository in production.
    pub fanout: Arc<dyn NotificationFanOut>,
    pub llm: Arc<dyn LanguageModel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting EduHive Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (EDUHIVE_API_PSK). Authentication is disabled!");
    }
    if config.llm_api_key.is_none() {
        tracing::warn!(
            "No language model key configured (EDUHIVE_LLM_API_KEY). Assistant replies are disabled"
        );
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    tracing::info!("Building search index...");
    let posts = repo.list_all_posts().await?;
    search.rebuild(&posts).await?;

    let llm: Arc<dyn LanguageModel> = Arc::from(assistant::language_model_from_config(&config));

    let state = AppState {
        fanout: repo.clone(),
        repo,
        search,
        cache: Arc::new(AppCache::new(config.cache_ttl)),
        config: Arc::new(config.clone()),
        llm,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Feed
        .route("/feed/revision", get(api::get_revision))
        // Profiles
        .route("/profiles", get(api::list_profiles))
        .route("/profiles", post(api::create_profile))
        .route("/profiles/by-username/{username}", get(api::get_profile_by_username))
        .route("/profiles/{id}", get(api::get_profile))
        .route("/profiles/{id}", put(api::update_profile))
        .route("/profiles/{id}", delete(api::delete_profile))
        .route("/profiles/{id}/follow", post(api::follow_profile))
        .route("/profiles/{id}/follow", delete(api::unfollow_profile))
        .route("/profiles/{id}/following", get(api::list_following))
        .route("/profiles/{id}/followers", get(api::list_followers))
        .route("/profiles/{id}/mutuals", get(api::list_mutuals))
        // Posts
        .route("/posts", get(api::get_feed))
        .route("/posts", post(api::create_post))
        .route("/posts/{id}", get(api::get_post))
        .route("/posts/{id}", put(api::update_post))
        .route("/posts/{id}", delete(api::delete_post))
        .route("/posts/{id}/like", post(api::like_post))
        .route("/posts/{id}/like", delete(api::unlike_post))
        .route("/posts/{id}/bookmark", post(api::bookmark_post))
        .route("/posts/{id}/bookmark", delete(api::unbookmark_post))
        .route("/bookmarks", get(api::list_bookmarks))
        // Comments
        .route("/posts/{id}/comments", get(api::list_comments))
        .route("/posts/{id}/comments", post(api::create_comment))
        .route("/comments/{id}", delete(api::delete_comment))
        // Mentions
        .route("/mentions/suggestions", get(api::mention_suggestions))
        .route("/mentions/apply", post(api::apply_suggestion))
        .route("/mentions/sync", post(api::sync_mentions))
        .route("/mentions/scan", post(api::scan_mentions))
        // Notifications
        .route("/notifications", get(api::list_notifications))
        .route("/notifications/unread-count", get(api::unread_count))
        .route("/notifications/read-all", post(api::mark_all_notifications_read))
        .route("/notifications/{id}/read", post(api::mark_notification_read))
        // Search
        .route("/search", get(api::search_posts))
        // Assistant
        .route("/assistant/chat", post(api::assistant_chat))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
