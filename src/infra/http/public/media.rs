//! Uploaded post images.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::application::error::HttpError;
use crate::infra::uploads::UploadStorageError;

use super::HttpState;

const SOURCE: &str = "infra::http::public::media::serve";

pub(super) async fn serve(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    match state.upload_storage.read(&path).await {
        Ok(data) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let content_type = HeaderValue::from_str(mime.essence_str())
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            let mut response = (StatusCode::OK, data).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            );
            response
        }
        Err(UploadStorageError::InvalidPath) => not_found(&path),
        Err(UploadStorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            not_found(&path)
        }
        Err(err) => {
            error!(target = SOURCE, path = %path, error = %err, "failed to read upload");
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn not_found(path: &str) -> Response {
    HttpError::new(
        SOURCE,
        StatusCode::NOT_FOUND,
        "File not found",
        format!("no stored upload at `{path}`"),
    )
    .into_response()
}
