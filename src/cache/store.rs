//! In-process page cache: an LRU of rendered pages with a fixed time-to-live.

use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::client::{CacheError, PageCache};
use super::config::CacheConfig;
use super::keys::{FeedKey, FeedScope};
use super::lock::{rw_read, rw_write};
use super::registry::ScopeRegistry;

const SOURCE: &str = "cache::store";

#[derive(Clone)]
struct CachedPage {
    body: Bytes,
    stored_at: Instant,
}

pub struct MemoryPageCache {
    ttl: Duration,
    pages: RwLock<LruCache<FeedKey, CachedPage>>,
    registry: ScopeRegistry,
}

impl MemoryPageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl,
            pages: RwLock::new(LruCache::new(config.capacity_non_zero())),
            registry: ScopeRegistry::new(),
        }
    }

    fn is_fresh(&self, page: &CachedPage) -> bool {
        page.stored_at.elapsed() < self.ttl
    }

    /// Drop every expired page. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut pages = rw_write(&self.pages, SOURCE, "purge_expired");
        let expired: Vec<FeedKey> = pages
            .iter()
            .filter(|(_, page)| !self.is_fresh(page))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            pages.pop(key);
            self.registry.unregister(key);
        }

        if !expired.is_empty() {
            debug!(purged = expired.len(), "purged expired feed pages");
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.pages, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PageCache for MemoryPageCache {
    async fn get(&self, key: &FeedKey) -> Result<Option<Bytes>, CacheError> {
        let mut pages = rw_write(&self.pages, SOURCE, "get");
        match pages.get(key) {
            Some(page) if self.is_fresh(page) => return Ok(Some(page.body.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // Expired: drop it so the caller repopulates.
        pages.pop(key);
        self.registry.unregister(key);
        Ok(None)
    }

    async fn put(&self, key: FeedKey, body: Bytes) -> Result<(), CacheError> {
        let page = CachedPage {
            body,
            stored_at: Instant::now(),
        };
        let mut pages = rw_write(&self.pages, SOURCE, "put");
        self.registry.register(&key);
        if let Some((evicted, _)) = pages.push(key.clone(), page) {
            if evicted != key {
                self.registry.unregister(&evicted);
                counter!("quill_feed_cache_evict_total", "kind" => evicted.scope.kind())
                    .increment(1);
            }
        }
        Ok(())
    }

    async fn invalidate_scope(&self, scope: &FeedScope) -> Result<usize, CacheError> {
        let mut pages = rw_write(&self.pages, SOURCE, "invalidate_scope");
        let keys = self.registry.take_scope(scope);
        let removed = keys
            .iter()
            .filter(|key| pages.pop(*key).is_some())
            .count();
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        rw_write(&self.pages, SOURCE, "clear").clear();
        self.registry.clear();
        Ok(())
    }
}
