//! Cache key definitions.
//!
//! A rendered feed page is identified by the feed it belongs to (its scope) and
//! the page number. Keys never carry viewer state except for the follow feed,
//! whose scope is the viewer.

use std::fmt;

use uuid::Uuid;

/// The feed a cached page belongs to; the unit of eager invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedScope {
    /// Global feed at `/`.
    Index,
    /// Group feed, keyed by slug.
    Group(String),
    /// Author profile feed, keyed by username.
    Profile(String),
    /// Follow feed of one viewer.
    Follow(Uuid),
}

impl FeedScope {
    /// Stable prefix identifying the selector kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedScope::Index => "index_page",
            FeedScope::Group(_) => "group_list_page",
            FeedScope::Profile(_) => "profile_page",
            FeedScope::Follow(_) => "follow_page",
        }
    }

    pub fn param(&self) -> String {
        match self {
            FeedScope::Index => String::new(),
            FeedScope::Group(slug) => slug.clone(),
            FeedScope::Profile(username) => username.clone(),
            FeedScope::Follow(viewer) => viewer.to_string(),
        }
    }

    pub fn page(&self, page: u32) -> FeedKey {
        FeedKey {
            scope: self.clone(),
            page,
        }
    }
}

/// Key of one rendered feed page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub scope: FeedScope,
    pub page: u32,
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope.kind(), self.scope.param(), self.page)
    }
}
