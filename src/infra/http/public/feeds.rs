//! The four feed pages: index, group, profile and favorites.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode, Uri},
    response::Response,
};

use crate::application::{
    error::AppError,
    feed::{CacheStatus, FeedSelector, FeedSubject, RenderedFeed, render_feed},
    identity::Viewer,
    pagination::PageQuery,
};
use crate::presentation::views::{
    FollowTemplate, FollowViewModel, GroupTemplate, GroupViewModel, IndexTemplate,
    IndexViewModel, LayoutContext, ProfileTemplate, ProfileViewModel, render_template_response,
};

use super::HttpState;
use crate::infra::http::{CurrentUser, error_page, require_auth};

/// Reports whether the feed fragment came from the page cache.
pub const FEED_CACHE_HEADER: HeaderName = HeaderName::from_static("x-feed-cache");

pub(super) async fn index(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = state.chrome(viewer.user());
    let result = async {
        let feed = state.feeds.resolve(&FeedSelector::Global).await?;
        render_feed(&state.feeds, &feed, query.requested()).await
    }
    .await;

    match result {
        Ok(rendered) => {
            let title = "Latest updates".to_string();
            let cache = rendered.cache;
            let model = IndexViewModel {
                title: title.clone(),
                feed_html: rendered.html,
            };
            with_cache_header(
                render_template_response(
                    IndexTemplate {
                        view: LayoutContext::new(chrome.with_title(title), model),
                    },
                    StatusCode::OK,
                ),
                cache,
            )
        }
        Err(err) => error_page(err, chrome),
    }
}

pub(super) async fn group(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = state.chrome(viewer.user());
    match load_group(&state, slug, query).await {
        Ok((model, cache)) => {
            let title = model.title.clone();
            with_cache_header(
                render_template_response(
                    GroupTemplate {
                        view: LayoutContext::new(chrome.with_title(title), model),
                    },
                    StatusCode::OK,
                ),
                cache,
            )
        }
        Err(err) => error_page(err, chrome),
    }
}

async fn load_group(
    state: &HttpState,
    slug: String,
    query: PageQuery,
) -> Result<(GroupViewModel, CacheStatus), AppError> {
    let feed = state.feeds.resolve(&FeedSelector::Group(slug)).await?;
    let FeedSubject::Group(group) = &feed.subject else {
        return Err(AppError::unexpected("group feed resolved to another subject"));
    };
    let RenderedFeed { html, cache } = render_feed(&state.feeds, &feed, query.requested()).await?;
    Ok((GroupViewModel::new(group, html), cache))
}

pub(super) async fn profile(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = state.chrome(viewer.user());
    match load_profile(&state, &viewer, username, query).await {
        Ok((model, cache)) => {
            let title = model.title.clone();
            with_cache_header(
                render_template_response(
                    ProfileTemplate {
                        view: LayoutContext::new(chrome.with_title(title), model),
                    },
                    StatusCode::OK,
                ),
                cache,
            )
        }
        Err(err) => error_page(err, chrome),
    }
}

async fn load_profile(
    state: &HttpState,
    viewer: &Viewer,
    username: String,
    query: PageQuery,
) -> Result<(ProfileViewModel, CacheStatus), AppError> {
    let feed = state.feeds.resolve(&FeedSelector::Author(username)).await?;
    let FeedSubject::Author(author) = &feed.subject else {
        return Err(AppError::unexpected("profile feed resolved to another subject"));
    };

    let RenderedFeed { html, cache } = render_feed(&state.feeds, &feed, query.requested()).await?;
    let post_count = state.feeds.count(&feed).await?;

    // No button for anonymous viewers or on one's own profile.
    let following = match viewer.user() {
        Some(user) if user.id != author.id => {
            Some(state.follows.is_following(user.id, author.id).await?)
        }
        _ => None,
    };

    Ok((
        ProfileViewModel::new(author, post_count, following, html),
        cache,
    ))
}

pub(super) async fn follow(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Query(query): Query<PageQuery>,
    uri: Uri,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = state.chrome(Some(user));

    let result = async {
        let feed = state.feeds.resolve(&FeedSelector::Followed(user.id)).await?;
        render_feed(&state.feeds, &feed, query.requested()).await
    }
    .await;

    match result {
        Ok(rendered) => {
            let title = "Favorites".to_string();
            let cache = rendered.cache;
            let model = FollowViewModel {
                title: title.clone(),
                feed_html: rendered.html,
            };
            with_cache_header(
                render_template_response(
                    FollowTemplate {
                        view: LayoutContext::new(chrome.with_title(title), model),
                    },
                    StatusCode::OK,
                ),
                cache,
            )
        }
        Err(err) => error_page(err, chrome),
    }
}

fn with_cache_header(mut response: Response, cache: CacheStatus) -> Response {
    if response.status().is_success() {
        let value = match cache {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        };
        response
            .headers_mut()
            .insert(FEED_CACHE_HEADER, HeaderValue::from_static(value));
    }
    response
}
