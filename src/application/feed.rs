//! Feed query engine and cached feed rendering.
//!
//! A [`FeedSelector`] names one of the four feeds. Resolving it checks that the
//! group or author exists and yields the store filter plus the cache scope.
//! [`render_feed`] then serves the rendered fragment for one page, from the page
//! cache when possible.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use askama::Template;
use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pagination::{Paginated, RequestedPage, paginate};
use crate::application::repos::{GroupsRepo, PostFilter, PostsRepo, UsersRepo};
use crate::cache::{CacheError, FeedKey, FeedScope, PageCache};
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};
use crate::presentation::views::{
    FeedFragmentTemplate, TemplateRenderError, group_href, profile_href,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSelector {
    Global,
    Group(String),
    Author(String),
    /// Posts by every author the viewer follows.
    Followed(Uuid),
}

/// The entity a feed was resolved against.
#[derive(Debug, Clone)]
pub enum FeedSubject {
    Global,
    Group(GroupRecord),
    Author(UserRecord),
    Followed(Uuid),
}

#[derive(Debug, Clone)]
pub struct ResolvedFeed {
    pub scope: FeedScope,
    pub filter: PostFilter,
    pub subject: FeedSubject,
}

impl ResolvedFeed {
    /// Path the paginator links are built on.
    pub fn base_path(&self) -> String {
        match &self.subject {
            FeedSubject::Global => "/".to_string(),
            FeedSubject::Group(group) => group_href(&group.slug),
            FeedSubject::Author(author) => profile_href(&author.username),
            FeedSubject::Followed(_) => "/follow/".to_string(),
        }
    }
}

/// Where a rendered fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

#[derive(Debug, Clone)]
pub struct RenderedFeed {
    pub html: String,
    pub cache: CacheStatus,
}

#[derive(Clone)]
pub struct FeedService {
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
    posts: Arc<dyn PostsRepo>,
    cache: Option<Arc<dyn PageCache>>,
    per_page: NonZeroU32,
}

impl FeedService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        groups: Arc<dyn GroupsRepo>,
        posts: Arc<dyn PostsRepo>,
        per_page: NonZeroU32,
    ) -> Self {
        Self {
            users,
            groups,
            posts,
            cache: None,
            per_page,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn PageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn per_page(&self) -> NonZeroU32 {
        self.per_page
    }

    pub fn cache(&self) -> Option<&Arc<dyn PageCache>> {
        self.cache.as_ref()
    }

    pub async fn resolve(&self, selector: &FeedSelector) -> Result<ResolvedFeed, AppError> {
        let resolved = match selector {
            FeedSelector::Global => ResolvedFeed {
                scope: FeedScope::Index,
                filter: PostFilter::All,
                subject: FeedSubject::Global,
            },
            FeedSelector::Group(slug) => {
                let group = self
                    .groups
                    .find_group_by_slug(slug)
                    .await?
                    .ok_or_else(|| AppError::not_found("group"))?;
                ResolvedFeed {
                    scope: FeedScope::Group(group.slug.clone()),
                    filter: PostFilter::Group(group.id),
                    subject: FeedSubject::Group(group),
                }
            }
            FeedSelector::Author(username) => {
                let author = self
                    .users
                    .find_user_by_username(username)
                    .await?
                    .ok_or_else(|| AppError::not_found("user"))?;
                ResolvedFeed {
                    scope: FeedScope::Profile(author.username.clone()),
                    filter: PostFilter::Author(author.id),
                    subject: FeedSubject::Author(author),
                }
            }
            FeedSelector::Followed(viewer) => ResolvedFeed {
                scope: FeedScope::Follow(*viewer),
                filter: PostFilter::FollowedBy(*viewer),
                subject: FeedSubject::Followed(*viewer),
            },
        };
        Ok(resolved)
    }

    /// One page of the feed straight from the store.
    pub async fn query_page(
        &self,
        feed: &ResolvedFeed,
        requested: RequestedPage,
    ) -> Result<Paginated<PostRecord>, AppError> {
        let filter = feed.filter;
        let page = paginate(
            self.per_page,
            requested,
            || self.posts.count_posts(filter),
            |offset, limit| self.posts.list_posts(filter, offset, limit),
        )
        .await?;
        Ok(page)
    }

    /// Number of posts in the feed, used for profile headers.
    pub async fn count(&self, feed: &ResolvedFeed) -> Result<u64, AppError> {
        Ok(self.posts.count_posts(feed.filter).await?)
    }

    async fn compute_fragment(
        &self,
        feed: &ResolvedFeed,
        requested: RequestedPage,
    ) -> Result<String, AppError> {
        let started = Instant::now();
        let page = self.query_page(feed, requested).await?;
        let html = FeedFragmentTemplate::new(&page, &feed.base_path())
            .render()
            .map_err(|err| {
                TemplateRenderError::new(
                    "application::feed::render_feed",
                    "Failed to render feed",
                    err,
                )
            })?;
        histogram!("quill_feed_render_ms", "kind" => feed.scope.kind())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        Ok(html)
    }
}

/// Serve the rendered fragment for one feed page.
///
/// The cache key uses the requested page after lower-bound normalisation, so
/// `?page=abc` and `?page=1` share an entry. Cache failures degrade to
/// recomputation and are never surfaced.
pub async fn render_feed(
    feeds: &FeedService,
    feed: &ResolvedFeed,
    requested: RequestedPage,
) -> Result<RenderedFeed, AppError> {
    let Some(cache) = feeds.cache() else {
        let html = feeds.compute_fragment(feed, requested).await?;
        return Ok(RenderedFeed {
            html,
            cache: CacheStatus::Bypass,
        });
    };

    let key = feed.scope.page(requested.get());
    let kind = key.scope.kind();

    if let Some(html) = lookup(cache.as_ref(), &key).await {
        counter!("quill_feed_cache_hit_total", "kind" => kind).increment(1);
        return Ok(RenderedFeed {
            html,
            cache: CacheStatus::Hit,
        });
    }

    counter!("quill_feed_cache_miss_total", "kind" => kind).increment(1);
    let html = feeds.compute_fragment(feed, requested).await?;
    if let Err(err) = cache.put(key.clone(), Bytes::from(html.clone())).await {
        counter!("quill_feed_cache_error_total", "op" => "put").increment(1);
        warn!(key = %key, error = %err, "failed to store feed page");
    } else {
        debug!(key = %key, "stored feed page");
    }

    Ok(RenderedFeed {
        html,
        cache: CacheStatus::Miss,
    })
}

async fn lookup(cache: &dyn PageCache, key: &FeedKey) -> Option<String> {
    let body = match cache.get(key).await {
        Ok(body) => body?,
        Err(err) => {
            counter!("quill_feed_cache_error_total", "op" => "get").increment(1);
            warn!(key = %key, error = %err, "feed cache read failed; recomputing");
            return None;
        }
    };

    match decode_page(key, body) {
        Ok(html) => Some(html),
        Err(err) => {
            counter!("quill_feed_cache_error_total", "op" => "decode").increment(1);
            warn!(key = %key, error = %err, "cached feed page unreadable; recomputing");
            None
        }
    }
}

fn decode_page(key: &FeedKey, body: Bytes) -> Result<String, CacheError> {
    String::from_utf8(body.to_vec()).map_err(|_| CacheError::Corrupt {
        key: key.to_string(),
    })
}
