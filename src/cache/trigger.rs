//! Cache trigger service.
//!
//! Translates post mutations into the set of feed scopes whose cached pages may
//! now be stale, and drops them. Failures are logged, never propagated: a
//! mutation that reached the store has succeeded regardless of the cache.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::entities::PostRecord;

use super::client::{CacheError, PageCache};
use super::keys::FeedScope;

/// Every feed scope that can list `post`.
///
/// Follow feeds are per viewer and expire by TTL only.
pub fn scopes_for_post(post: &PostRecord) -> Vec<FeedScope> {
    let mut scopes = vec![
        FeedScope::Index,
        FeedScope::Profile(post.author.username.clone()),
    ];
    if let Some(slug) = post.group_slug() {
        scopes.push(FeedScope::Group(slug.to_string()));
    }
    scopes
}

pub struct CacheTrigger {
    cache: Arc<dyn PageCache>,
}

impl CacheTrigger {
    pub fn new(cache: Arc<dyn PageCache>) -> Self {
        Self { cache }
    }

    /// Invalidate each distinct scope once.
    pub async fn invalidate<I>(&self, scopes: I, reason: &'static str)
    where
        I: IntoIterator<Item = FeedScope>,
    {
        let mut seen = HashSet::new();
        for scope in scopes {
            if !seen.insert(scope.clone()) {
                continue;
            }
            match self.cache.invalidate_scope(&scope).await {
                Ok(removed) => {
                    counter!("quill_feed_cache_invalidated_total", "kind" => scope.kind())
                        .increment(removed as u64);
                    debug!(
                        reason,
                        kind = scope.kind(),
                        param = %scope.param(),
                        removed,
                        "invalidated feed pages"
                    );
                }
                Err(err) => {
                    counter!("quill_feed_cache_error_total", "op" => "invalidate").increment(1);
                    warn!(
                        reason,
                        kind = scope.kind(),
                        param = %scope.param(),
                        error = %err,
                        "failed to invalidate feed pages"
                    );
                }
            }
        }
    }

    pub async fn post_created(&self, post: &PostRecord) {
        self.invalidate(scopes_for_post(post), "post_created").await;
    }

    pub async fn post_deleted(&self, post: &PostRecord) {
        self.invalidate(scopes_for_post(post), "post_deleted").await;
    }

    /// Covers the group the post left as well as the one it joined.
    pub async fn post_edited(&self, before: &PostRecord, after: &PostRecord) {
        let scopes = scopes_for_post(before)
            .into_iter()
            .chain(scopes_for_post(after));
        self.invalidate(scopes, "post_edited").await;
    }

    /// Remove every cached page.
    pub async fn clear_all(&self, reason: &'static str) -> Result<(), CacheError> {
        match self.cache.clear().await {
            Ok(()) => {
                debug!(reason, "cleared page cache");
                Ok(())
            }
            Err(err) => {
                counter!("quill_feed_cache_error_total", "op" => "clear").increment(1);
                warn!(reason, error = %err, "failed to clear page cache");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::cache::{CacheConfig, MemoryPageCache};
    use crate::domain::entities::{AuthorRef, GroupRef};

    fn post(username: &str, group: Option<&str>) -> PostRecord {
        PostRecord {
            id: 7,
            text: "hello".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            author: AuthorRef {
                id: Uuid::new_v4(),
                username: username.into(),
                display_name: username.into(),
            },
            group: group.map(|slug| GroupRef {
                id: 1,
                slug: slug.into(),
                title: slug.into(),
            }),
            image: None,
        }
    }

    async fn seed(cache: &MemoryPageCache, scopes: &[FeedScope]) {
        for scope in scopes {
            cache
                .put(scope.page(1), Bytes::from_static(b"page"))
                .await
                .unwrap();
        }
    }

    #[test]
    fn scopes_cover_index_profile_and_group() {
        let scopes = scopes_for_post(&post("leo", Some("rust")));
        assert_eq!(
            scopes,
            vec![
                FeedScope::Index,
                FeedScope::Profile("leo".into()),
                FeedScope::Group("rust".into()),
            ]
        );
        assert_eq!(scopes_for_post(&post("leo", None)).len(), 2);
    }

    #[tokio::test]
    async fn post_created_keeps_unrelated_and_follow_pages() {
        let cache = Arc::new(MemoryPageCache::new(&CacheConfig::default()));
        let follow = FeedScope::Follow(Uuid::new_v4());
        let other_group = FeedScope::Group("python".into());
        seed(
            &cache,
            &[
                FeedScope::Index,
                FeedScope::Group("rust".into()),
                FeedScope::Profile("leo".into()),
                other_group.clone(),
                follow.clone(),
            ],
        )
        .await;

        let trigger = CacheTrigger::new(cache.clone());
        trigger.post_created(&post("leo", Some("rust"))).await;

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&other_group.page(1)).await.unwrap().is_some());
        assert!(cache.get(&follow.page(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn post_edited_invalidates_old_and_new_group() {
        let cache = Arc::new(MemoryPageCache::new(&CacheConfig::default()));
        let old_group = FeedScope::Group("rust".into());
        let new_group = FeedScope::Group("python".into());
        seed(&cache, &[old_group.clone(), new_group.clone()]).await;

        let trigger = CacheTrigger::new(cache.clone());
        trigger
            .post_edited(&post("leo", Some("rust")), &post("leo", Some("python")))
            .await;

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn post_deleted_drops_author_group_and_index_pages() {
        let cache = Arc::new(MemoryPageCache::new(&CacheConfig::default()));
        let other_profile = FeedScope::Profile("mia".into());
        seed(
            &cache,
            &[
                FeedScope::Index,
                FeedScope::Group("rust".into()),
                FeedScope::Profile("leo".into()),
                other_profile.clone(),
            ],
        )
        .await;

        CacheTrigger::new(cache.clone())
            .post_deleted(&post("leo", Some("rust")))
            .await;

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&other_profile.page(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_all_empties_cache() {
        let cache = Arc::new(MemoryPageCache::new(&CacheConfig::default()));
        seed(&cache, &[FeedScope::Index, FeedScope::Follow(Uuid::nil())]).await;

        CacheTrigger::new(cache.clone())
            .clear_all("test")
            .await
            .unwrap();
        assert!(cache.is_empty());
    }
}
