use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::application::{error::AppError, error::ErrorReport, groups::NewGroup};

use super::AdminState;

const SOURCE: &str = "infra::http::admin::groups";

#[derive(Debug, Deserialize)]
pub(super) struct CreateGroupRequest {
    #[serde(default)]
    slug: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
}

pub(super) async fn create_group(
    State(state): State<AdminState>,
    Json(request): Json<CreateGroupRequest>,
) -> Response {
    let input = NewGroup {
        slug: request.slug,
        title: request.title,
        description: request.description,
    };

    match state.groups.create_group(input).await {
        Ok(group) => (StatusCode::CREATED, Json(group)).into_response(),
        Err(err) => json_error(err),
    }
}

pub(super) async fn delete_group(
    State(state): State<AdminState>,
    Path(slug): Path<String>,
) -> Response {
    match state.groups.delete_group(&slug).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => json_error(err),
    }
}

fn json_error(err: AppError) -> Response {
    let status = err.status_code();
    let body = match err.validation_failure() {
        Some((field, message)) => json!({ "error": message, "field": field }),
        None if status.is_server_error() => json!({ "error": "internal error" }),
        None => json!({ "error": err.to_string() }),
    };
    let mut response = (status, Json(body)).into_response();
    ErrorReport::from_error(SOURCE, status, &err).attach(&mut response);
    response
}
