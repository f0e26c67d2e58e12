//! Request identity: the proxy-asserted user and the login redirect.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, HeaderName, Uri, request::Parts};
use axum::response::{IntoResponse, Response};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::application::identity::Viewer;
use crate::config::IdentitySettings;
use crate::domain::entities::UserRecord;

use super::found;
use super::public::HttpState;

/// Characters escaped in the `next` parameter; `/` stays readable.
const NEXT_PARAM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The viewer of the current request. Anonymous when the identity header is absent.
pub struct CurrentUser(pub Viewer);

impl FromRequestParts<HttpState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let settings = &state.identity_settings;
        let Some(username) = header_text(&parts.headers, &settings.user_header) else {
            return Ok(Self(Viewer::anonymous()));
        };
        let display_name = header_text(&parts.headers, &settings.name_header);

        state
            .identity
            .recognise(username, display_name)
            .await
            .map(Self)
            .map_err(IntoResponse::into_response)
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// `{login_path}?next={path}` for the request being turned away.
pub fn login_location(login_path: &str, uri: &Uri) -> String {
    let next = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    format!("{login_path}?next={}", utf8_percent_encode(next, NEXT_PARAM))
}

/// The signed-in user, or the redirect that sends an anonymous visitor to log in.
pub fn require_auth<'a>(
    viewer: &'a Viewer,
    settings: &IdentitySettings,
    uri: &Uri,
) -> Result<&'a UserRecord, Response> {
    viewer
        .user()
        .ok_or_else(|| found(&login_location(&settings.login_path, uri)))
}
