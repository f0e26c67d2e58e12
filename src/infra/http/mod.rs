mod admin;
mod identity;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use identity::{CurrentUser, login_location, require_auth};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use public::{FEED_CACHE_HEADER, HttpState, build_router};

use axum::http::{HeaderValue, StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};

use crate::application::error::{AppError, ErrorReport, HttpError};
use crate::application::repos::RepoError;
use crate::presentation::views::{
    LayoutChrome, render_forbidden_response, render_not_found_response,
};

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(err) => HttpError::new(
            "infra::http::found",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Redirect failed",
            format!("invalid redirect target `{location}`: {err}"),
        )
        .into_response(),
    }
}

/// Render an application error as a full HTML page where one exists.
pub(crate) fn error_page(err: AppError, chrome: LayoutChrome) -> Response {
    if err.is_not_found() {
        let mut response = render_not_found_response(chrome);
        ErrorReport::from_error("infra::http::error_page", StatusCode::NOT_FOUND, &err)
            .attach(&mut response);
        return response;
    }
    if err.is_forbidden() {
        let mut response = render_forbidden_response(chrome);
        ErrorReport::from_error("infra::http::error_page", StatusCode::FORBIDDEN, &err)
            .attach(&mut response);
        return response;
    }
    err.into_response()
}
