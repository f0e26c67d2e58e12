//! Feed page cache.
//!
//! Rendered feed fragments are memoized per `(kind, param, page)` for a short
//! time-to-live and dropped eagerly when a post in their feed changes:
//!
//! - [`PageCache`]: the injected client seam, fallible so callers can fall back
//!   to recomputation
//! - [`MemoryPageCache`]: process-local LRU with TTL and a scope registry
//! - [`CacheTrigger`]: maps post mutations to the scopes they affect
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 20
//! capacity = 512
//! sweep_interval_seconds = 60
//! ```

mod client;
mod config;
mod keys;
mod lock;
mod registry;
mod store;
mod trigger;

pub use client::{CacheError, PageCache};
pub use config::CacheConfig;
pub use keys::{FeedKey, FeedScope};
pub use registry::ScopeRegistry;
pub use store::MemoryPageCache;
pub use trigger::{CacheTrigger, scopes_for_post};
