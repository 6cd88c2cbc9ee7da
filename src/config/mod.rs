//! Configuration module for the EduHive backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Base URL of the OpenAI-compatible completion endpoint
    pub llm_api_url: String,
    /// API key for the language model; the assistant is disabled without one
    pub llm_api_key: Option<String>,
    /// Model identifier sent with every completion request
    pub llm_model: String,
    /// Lifetime of cached feed pages, unread counts and post stats
    pub cache_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("EDUHIVE_API_PSK").ok();

        let db_path = env::var("EDUHIVE_DB_PATH")
            .unwrap_or_else(|_| "./data/eduhive.sqlite".to_string())
            .into();

        let index_path = env::var("EDUHIVE_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = env::var("EDUHIVE_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .expect("Invalid EDUHIVE_BIND_ADDR format");

        let log_level = env::var("EDUHIVE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let llm_api_url =
            env::var("EDUHIVE_LLM_API_URL").unwrap_or_else(|_| DEFAULT_LLM_API_URL.to_string());
        let llm_api_key = env::var("EDUHIVE_LLM_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let llm_model =
            env::var("EDUHIVE_LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());

        let cache_ttl_secs = env::var("EDUHIVE_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);

        Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            llm_api_url,
            llm_api_key,
            llm_model,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("EDUHIVE_API_PSK");
        env::remove_var("EDUHIVE_DB_PATH");
        env::remove_var("EDUHIVE_INDEX_PATH");
        env::remove_var("EDUHIVE_BIND_ADDR");
        env::remove_var("EDUHIVE_LOG_LEVEL");
        env::remove_var("EDUHIVE_LLM_API_URL");
        env::remove_var("EDUHIVE_LLM_API_KEY");
        env::remove_var("EDUHIVE_LLM_MODEL");
        env::remove_var("EDUHIVE_CACHE_TTL_SECS");

        let config = Config::from_env();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/eduhive.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.llm_api_url, DEFAULT_LLM_API_URL);
        assert!(config.llm_api_key.is_none());
        assert_eq!(config.llm_model, DEFAULT_LLM_MODEL);
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
    }
}
