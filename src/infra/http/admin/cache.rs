use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::error::HttpError;

use super::AdminState;

pub(super) async fn invalidate_cache(State(state): State<AdminState>) -> Response {
    let Some(trigger) = &state.cache_trigger else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match trigger.clear_all("admin").await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => HttpError::from_error(
            "infra::http::admin::invalidate_cache",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to clear page cache",
            &err,
        )
        .into_response(),
    }
}
