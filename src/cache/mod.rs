//! In-process TTL caches for hot read paths.
//!
//! Caches are owned by [`AppCache`] and injected through application state.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::models::{Post, PostStats};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Key-value cache where every entry carries its own expiry.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh value for `key`; expired entries are dropped on the way.
    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(key);
        }
        None
    }

    /// Store `value` for `ttl`. Expired entries are swept on every write so
    /// keys that are never read again don't pile up.
    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Drop every entry whose key matches.
    pub async fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) {
        self.entries.write().await.retain(|k, _| !predicate(k));
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Feed page key: `(limit, offset)`.
pub type FeedPageKey = (usize, usize);

/// Post stats are viewer-specific: `(post_id, viewer_id)`.
pub type StatsKey = (String, String);

/// All caches the API uses, sharing one TTL.
pub struct AppCache {
    pub ttl: Duration,
    pub feed: TtlCache<FeedPageKey, Vec<Post>>,
    pub unread: TtlCache<String, i64>,
    pub stats: TtlCache<StatsKey, PostStats>,
}

impl AppCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            feed: TtlCache::new(),
            unread: TtlCache::new(),
            stats: TtlCache::new(),
        }
    }

    /// Any post, comment or like write changes what the feed shows.
    pub async fn invalidate_feed(&self) {
        self.feed.clear().await;
    }

    /// Drop cached stats of a post for every viewer.
    pub async fn invalidate_post_stats(&self, post_id: &str) {
        self.stats.invalidate_where(|(p, _)| p == post_id).await;
    }
}
