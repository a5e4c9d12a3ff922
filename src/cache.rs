//! Child-id cache.
//!
//! Entries map `(parent id, sort spec)` to the already compacted and sorted child ids of that
//! parent. There is no per-entry TTL and no partial invalidation: an entry lives as long as the
//! cache instance holding it, and an instance lives for one principal's session under one
//! hidden/viewable partition.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::sort::SortSpec;
use crate::visibility::VisibilitySet;

/// Derives the cache key of a parent/sort pair. Pure and stable: equal inputs always give
/// equal keys, and the canonical sort form keeps distinct specs apart.
pub fn cache_key(parent: i64, sort: &SortSpec) -> String {
    format!("children:{}:{}", parent, sort)
}

/// ChildIdCache
///
/// Cache interface consumed by `SortedChildCache`.
pub trait ChildIdCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<Vec<i64>>>;
    fn set(&self, key: String, ids: Arc<Vec<i64>>);
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: usize,
}

/// MemoryChildCache
///
/// Concurrent in-memory `ChildIdCache`. Two requests racing on the same missing key both
/// compute it; the last `set` wins and both computed the same ids.
#[derive(Default)]
pub struct MemoryChildCache {
    entries: DashMap<String, Arc<Vec<i64>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryChildCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len(),
        }
    }
}

impl ChildIdCache for MemoryChildCache {
    fn get(&self, key: &str) -> Option<Arc<Vec<i64>>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: String, ids: Arc<Vec<i64>>) {
        self.entries.insert(key, ids);
    }
}

struct SessionCache {
    created: Instant,
    // Hidden ids the cached lists were compacted under.
    hidden: HashSet<i64>,
    cache: Arc<MemoryChildCache>,
}

/// CacheRegistry
///
/// Hands out one `MemoryChildCache` per principal. An instance is dropped as a whole and
/// replaced by an empty one when it is older than the configured lifetime, or when the
/// requesting partition hides a different set of ids than the one it was filled under.
pub struct CacheRegistry {
    sessions: DashMap<Uuid, SessionCache>,
    lifetime: Duration,
}

impl CacheRegistry {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            lifetime,
        }
    }

    pub fn cache_for(&self, user_id: Uuid, visibility: &VisibilitySet) -> Arc<MemoryChildCache> {
        let now = Instant::now();
        if let Some(session) = self.sessions.get(&user_id) {
            let fresh = now.duration_since(session.created) < self.lifetime;
            if fresh && session.hidden == *visibility.hidden() {
                return Arc::clone(&session.cache);
            }
            if fresh {
                tracing::debug!(user = %user_id, "hidden set changed, dropping category cache");
            }
        }

        // Only reached when a session starts or is replaced, so sweeping here stays cheap.
        let lifetime = self.lifetime;
        self.sessions
            .retain(|_, session| now.duration_since(session.created) < lifetime);

        let cache = Arc::new(MemoryChildCache::new());
        tracing::debug!(user = %user_id, "new category cache session");
        self.sessions.insert(
            user_id,
            SessionCache {
                created: now,
                hidden: visibility.hidden().clone(),
                cache: Arc::clone(&cache),
            },
        );
        cache
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
