//! Form payloads of the post and comment routes.

use axum::extract::{Form, rejection::FormRejection};
use axum::http::StatusCode;
use axum_extra::extract::{Multipart, multipart::MultipartRejection};
use bytes::Bytes;
use serde::Deserialize;
use tracing::warn;

use crate::application::error::HttpError;
use crate::application::media::ImageUpload;
use crate::application::posts::PostDraft;

const SOURCE: &str = "infra::http::public::forms";

/// Fields of the create/edit form as submitted.
#[derive(Debug, Default)]
pub(super) struct PostForm {
    pub(super) text: String,
    pub(super) group: Option<String>,
    pub(super) image: Option<ImageUpload>,
}

impl PostForm {
    /// An unparseable group id is kept as an unknown group so validation can
    /// report it on the form.
    pub(super) fn group_id(&self) -> Option<i64> {
        self.group
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| value.parse::<i64>().unwrap_or(-1))
    }

    pub(super) fn into_draft(self) -> PostDraft {
        let group_id = self.group_id();
        PostDraft {
            text: self.text,
            group_id,
            image: self.image,
        }
    }
}

pub(super) async fn read_post_form(multipart: &mut Multipart) -> Result<PostForm, HttpError> {
    let mut form = PostForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                warn!(
                    target = SOURCE,
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                return Err(HttpError::new(
                    SOURCE,
                    status,
                    if status == StatusCode::PAYLOAD_TOO_LARGE {
                        "Upload exceeds the size limit"
                    } else {
                        "Invalid form data"
                    },
                    err.to_string(),
                ));
            }
        };

        match field.name() {
            Some("text") => form.text = field_text(field).await?,
            Some("group") => form.group = Some(field_text(field).await?),
            Some("image") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|value| !value.trim().is_empty());
                let data = field_bytes(field).await?;
                // Browsers send an empty part when no file was chosen.
                if let Some(filename) = filename.filter(|_| !data.is_empty()) {
                    form.image = Some(ImageUpload { filename, data });
                }
            }
            _ => continue,
        }
    }

    Ok(form)
}

/// Unwrap a multipart body whose extraction was deferred past the login gate.
pub(super) fn accept_multipart(
    body: Result<Multipart, MultipartRejection>,
) -> Result<Multipart, HttpError> {
    body.map_err(|rejection| {
        HttpError::new(
            SOURCE,
            rejection.status(),
            "Invalid form data",
            rejection.body_text(),
        )
    })
}

/// Unwrap a urlencoded body whose extraction was deferred past the login gate.
pub(super) fn accept_form<T>(body: Result<Form<T>, FormRejection>) -> Result<T, HttpError> {
    body.map(|Form(form)| form).map_err(|rejection| {
        HttpError::new(
            SOURCE,
            rejection.status(),
            "Invalid form data",
            rejection.body_text(),
        )
    })
}

async fn field_text(field: axum_extra::extract::multipart::Field) -> Result<String, HttpError> {
    field.text().await.map_err(|err| {
        HttpError::new(SOURCE, err.status(), "Invalid form data", err.to_string())
    })
}

async fn field_bytes(field: axum_extra::extract::multipart::Field) -> Result<Bytes, HttpError> {
    field.bytes().await.map_err(|err| {
        HttpError::new(SOURCE, err.status(), "Invalid form data", err.to_string())
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    pub(super) text: String,
}

/// Path ids that are not integers address nothing.
pub(super) fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_parsing() {
        let mut form = PostForm::default();
        assert_eq!(form.group_id(), None);
        form.group = Some(" ".into());
        assert_eq!(form.group_id(), None);
        form.group = Some("12".into());
        assert_eq!(form.group_id(), Some(12));
        form.group = Some("rust".into());
        assert_eq!(form.group_id(), Some(-1));
    }

    #[test]
    fn post_ids_must_be_positive_integers() {
        assert_eq!(parse_post_id("7"), Some(7));
        assert_eq!(parse_post_id("0"), None);
        assert_eq!(parse_post_id("abc"), None);
    }
}
