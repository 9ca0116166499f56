//! Sharded TTL store for per-user session data
//!
//! Entries are keyed by user and scope, expire after a per-entry TTL and are evicted
//! lazily on read or in bulk by [`SessionCache::purge_expired`].

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::app::models::UserId;

use super::config::SessionConfig;

/// Namespace of a cached value within one user's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionScope {
    /// Latest search results
    Search,
    /// Favorites listing
    Favorites,
    /// Chart listing
    Chart,
}

impl SessionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionScope::Search => "search",
            SessionScope::Favorites => "favorites",
            SessionScope::Chart => "chart",
        }
    }
}

/// Cache key: one slot per user and scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: UserId,
    pub scope: SessionScope,
}

impl SessionKey {
    pub fn new(user_id: UserId, scope: SessionScope) -> Self {
        Self { user_id, scope }
    }

    pub fn search(user_id: UserId) -> Self {
        Self::new(user_id, SessionScope::Search)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope.as_str(), self.user_id)
    }
}

/// A cached value and the instant it stops being visible
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expire_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expire_at
    }
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCacheStats {
    /// Entries currently stored, including expired ones not yet evicted
    pub entries: usize,
    /// Number of shards
    pub shards: usize,
}

type Shard<V> = RwLock<HashMap<SessionKey, CacheEntry<V>>>;

/// Per-key TTL store for ephemeral session data
pub struct SessionCache<V> {
    shards: Vec<Shard<V>>,
}

impl<V: Clone + Send + Sync> SessionCache<V> {
    /// Create a cache with the configured number of shards
    pub fn new(config: &SessionConfig) -> Self {
        let shards = (0..config.shard_count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    fn shard(&self, key: &SessionKey) -> &Shard<V> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry
    pub async fn set(&self, key: SessionKey, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expire_at: Instant::now() + ttl,
        };
        self.shard(&key).write().await.insert(key, entry);
        debug!("Cache SET: {} (TTL: {}s)", key, ttl.as_secs());
    }

    /// Get the value under `key` if it has not expired
    ///
    /// An expired entry is evicted and reported as absent.
    pub async fn get(&self, key: &SessionKey) -> Option<V> {
        let shard = self.shard(key);
        let now = Instant::now();

        {
            let entries = shard.read().await;
            match entries.get(key) {
                None => {
                    debug!("Cache MISS: {}", key);
                    return None;
                }
                Some(entry) if !entry.is_expired_at(now) => {
                    debug!("Cache HIT: {}", key);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a concurrent set may have refreshed it
        let mut entries = shard.write().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!("Cache EXPIRED: {}", key);
                None
            }
            None => None,
        }
    }

    /// Remove the entry under `key`, returning whether one existed
    pub async fn remove(&self, key: &SessionKey) -> bool {
        self.shard(key).write().await.remove(key).is_some()
    }

    /// Evict every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut entries = shard.write().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            removed += before - entries.len();
        }
        if removed > 0 {
            debug!("Purged {} expired session entries", removed);
        }
        removed
    }

    /// Remove all entries
    pub async fn clear(&self) {
        for shard in &self.shards {
            shard.write().await.clear();
        }
        debug!("Cache cleared");
    }

    /// Number of stored entries, expired or not
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> SessionCacheStats {
        SessionCacheStats {
            entries: self.len().await,
            shards: self.shards.len(),
        }
    }
}

impl<V: Clone + Send + Sync> Default for SessionCache<V> {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}
