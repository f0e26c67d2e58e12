mod feeds;
mod follows;
mod forms;
mod media;
mod posts;

pub use feeds::FEED_CACHE_HEADER;

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    middleware,
    response::Response,
    routing::{get, post},
};

use crate::application::{
    feed::FeedService, follows::FollowService, identity::IdentityService, posts::PostService,
    repos::HealthRepo,
};
use crate::config::IdentitySettings;
use crate::domain::entities::UserRecord;
use crate::infra::uploads::UploadStorage;
use crate::presentation::views::{LayoutChrome, render_not_found_response};

use super::identity::CurrentUser;
use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feeds: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub identity: Arc<IdentityService>,
    pub identity_settings: Arc<IdentitySettings>,
    pub health: Arc<dyn HealthRepo>,
    pub upload_storage: Arc<UploadStorage>,
    pub upload_body_limit: usize,
}

impl HttpState {
    /// Page frame for `viewer`; rebuilt on every request.
    pub fn chrome(&self, viewer: Option<&UserRecord>) -> LayoutChrome {
        LayoutChrome::new(viewer, &self.identity_settings.login_path)
    }
}

pub fn build_router(state: HttpState) -> Router {
    let upload_body_limit = state.upload_body_limit;

    let form_routes = Router::new()
        .route("/create/", get(posts::create_form).post(posts::create_submit))
        .route(
            "/posts/{id}/edit/",
            get(posts::edit_form).post(posts::edit_submit),
        )
        .layer(DefaultBodyLimit::max(upload_body_limit));

    Router::new()
        .route("/", get(feeds::index))
        .route("/group/{slug}/", get(feeds::group))
        .route("/profile/{username}/", get(feeds::profile))
        .route("/follow/", get(feeds::follow))
        .route("/posts/{id}/", get(posts::detail))
        .route("/posts/{id}/delete/", post(posts::delete))
        .route("/posts/{id}/comment/", post(posts::add_comment))
        .route("/profile/{username}/follow/", get(follows::follow))
        .route("/profile/{username}/unfollow/", get(follows::unfollow))
        .route("/media/{*path}", get(media::serve))
        .route("/_health/db", get(public_health))
        .merge(form_routes)
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn fallback(State(state): State<HttpState>, CurrentUser(viewer): CurrentUser) -> Response {
    render_not_found_response(state.chrome(viewer.user()))
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.health_check().await)
}
