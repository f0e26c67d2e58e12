//! Scope registry.
//!
//! Tracks which cached page keys belong to which feed scope so that a post
//! mutation can drop exactly the affected pages.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{FeedKey, FeedScope};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

pub struct ScopeRegistry {
    scopes: RwLock<HashMap<FeedScope, HashSet<FeedKey>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, key: &FeedKey) {
        rw_write(&self.scopes, SOURCE, "register")
            .entry(key.scope.clone())
            .or_default()
            .insert(key.clone());
    }

    /// Forget a single key, dropping the scope entry once it is empty.
    pub fn unregister(&self, key: &FeedKey) {
        let mut scopes = rw_write(&self.scopes, SOURCE, "unregister");
        if let Some(keys) = scopes.get_mut(&key.scope) {
            keys.remove(key);
            if keys.is_empty() {
                scopes.remove(&key.scope);
            }
        }
    }

    /// Remove and return every key registered under `scope`.
    pub fn take_scope(&self, scope: &FeedScope) -> HashSet<FeedKey> {
        rw_write(&self.scopes, SOURCE, "take_scope")
            .remove(scope)
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        rw_write(&self.scopes, SOURCE, "clear").clear();
    }

    pub fn scope_count(&self) -> usize {
        rw_read(&self.scopes, SOURCE, "scope_count").len()
    }

    pub fn key_count(&self) -> usize {
        rw_read(&self.scopes, SOURCE, "key_count")
            .values()
            .map(HashSet::len)
            .sum()
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
