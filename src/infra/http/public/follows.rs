use axum::{
    extract::{Path, State},
    http::Uri,
    response::Response,
};
use tracing::debug;

use crate::application::follows::{FollowOutcome, UnfollowOutcome};
use crate::infra::http::{CurrentUser, error_page, found, require_auth};
use crate::presentation::views::profile_href;

use super::HttpState;

pub(super) async fn follow(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(username): Path<String>,
    uri: Uri,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.follows.follow(user, &username).await {
        Ok(outcome) => {
            if outcome != FollowOutcome::Followed {
                debug!(?outcome, author = %username, "follow request changed nothing");
            }
            found(&profile_href(&username))
        }
        Err(err) => error_page(err, state.chrome(Some(user))),
    }
}

pub(super) async fn unfollow(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(username): Path<String>,
    uri: Uri,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.follows.unfollow(user, &username).await {
        Ok(UnfollowOutcome::Unfollowed) => found(&profile_href(&username)),
        Ok(UnfollowOutcome::NotFollowing) => {
            debug!(author = %username, "unfollow without an edge");
            found(&profile_href(&username))
        }
        Err(err) => error_page(err, state.chrome(Some(user))),
    }
}
