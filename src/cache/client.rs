//! The page cache seam consumed by the feed renderer and the invalidation trigger.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::keys::{FeedKey, FeedScope};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("page cache unavailable: {0}")]
    Unavailable(String),
    #[error("cached page `{key}` is not valid UTF-8")]
    Corrupt { key: String },
}

/// A key-value store for rendered feed pages.
///
/// Every method is fallible so callers can degrade to recomputation; the cache
/// is never a source of truth.
#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &FeedKey) -> Result<Option<Bytes>, CacheError>;

    async fn put(&self, key: FeedKey, body: Bytes) -> Result<(), CacheError>;

    /// Drop every page of `scope`, returning how many were removed.
    async fn invalidate_scope(&self, scope: &FeedScope) -> Result<usize, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}
