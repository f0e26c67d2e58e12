//! Post detail, authoring and comment routes.

use axum::{
    extract::{Form, Path, State, rejection::FormRejection},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{Multipart, multipart::MultipartRejection};

use crate::application::error::AppError;
use crate::domain::entities::{GroupRecord, UserRecord};
use crate::infra::http::{CurrentUser, error_page, found, require_auth};
use crate::presentation::views::{
    LayoutChrome, LayoutContext, PostDetailTemplate, PostDetailViewModel, PostFormErrors,
    PostFormTemplate, PostFormViewModel, post_href, profile_href, render_not_found_response,
    render_template_response,
};

use super::HttpState;
use super::forms::{
    CommentForm, PostForm, accept_form, accept_multipart, parse_post_id, read_post_form,
};

pub(super) async fn detail(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = state.chrome(viewer.user());
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.load_detail(post_id).await {
        Ok(detail) => {
            let model = PostDetailViewModel::new(
                &detail.post,
                detail.author_post_count,
                &detail.comments,
                viewer.user(),
            );
            render_detail(chrome, model, StatusCode::OK)
        }
        Err(err) => error_page(err, chrome),
    }
}

pub(super) async fn create_form(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    uri: Uri,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = state.chrome(Some(user));

    match state.posts.list_groups().await {
        Ok(groups) => render_form(chrome, PostFormViewModel::create(&groups)),
        Err(err) => error_page(err, chrome),
    }
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    uri: Uri,
    body: Result<Multipart, MultipartRejection>,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = state.chrome(Some(user));

    let mut multipart = match accept_multipart(body) {
        Ok(multipart) => multipart,
        Err(err) => return err.into_response(),
    };
    let form = match read_post_form(&mut multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };
    let (text, group_id) = (form.text.clone(), form.group_id());

    match state.posts.create_post(user, form.into_draft()).await {
        Ok(_) => found(&profile_href(&user.username)),
        Err(err) => match err.validation_failure() {
            Some((field, message)) => {
                let errors = PostFormErrors::for_field(field, message);
                rerender_form(&state, chrome, None, &text, group_id, errors).await
            }
            None => error_page(err, chrome),
        },
    }
}

pub(super) async fn edit_form(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(raw_id): Path<String>,
    uri: Uri,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = state.chrome(Some(user));
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    let result = async {
        let post = state.posts.load_for_edit(user, post_id).await?;
        let groups = state.posts.list_groups().await?;
        Ok::<_, AppError>(PostFormViewModel::edit(&post, &groups))
    }
    .await;

    match result {
        Ok(model) => render_form(chrome, model),
        Err(err) => error_page(err, chrome),
    }
}

pub(super) async fn edit_submit(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(raw_id): Path<String>,
    uri: Uri,
    body: Result<Multipart, MultipartRejection>,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = state.chrome(Some(user));
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    let mut multipart = match accept_multipart(body) {
        Ok(multipart) => multipart,
        Err(err) => return err.into_response(),
    };
    let form: PostForm = match read_post_form(&mut multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };
    let (text, group_id) = (form.text.clone(), form.group_id());

    match state.posts.edit_post(user, post_id, form.into_draft()).await {
        Ok(post) => found(&post_href(post.id)),
        Err(err) => match err.validation_failure() {
            Some((field, message)) => {
                let errors = PostFormErrors::for_field(field, message);
                rerender_form(&state, chrome, Some((user, post_id)), &text, group_id, errors).await
            }
            None => error_page(err, chrome),
        },
    }
}

pub(super) async fn delete(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(raw_id): Path<String>,
    uri: Uri,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = state.chrome(Some(user));
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.delete_post(user, post_id).await {
        Ok(_) => found(&profile_href(&user.username)),
        Err(err) => error_page(err, chrome),
    }
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    CurrentUser(viewer): CurrentUser,
    Path(raw_id): Path<String>,
    uri: Uri,
    body: Result<Form<CommentForm>, FormRejection>,
) -> Response {
    let user = match require_auth(&viewer, &state.identity_settings, &uri) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = state.chrome(Some(user));
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };
    let form: CommentForm = match accept_form(body) {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    let err = match state.posts.add_comment(user, post_id, &form.text).await {
        Ok(_) => return found(&post_href(post_id)),
        Err(err) => err,
    };
    let Some((_, message)) = err.validation_failure() else {
        return error_page(err, chrome);
    };

    match state.posts.load_detail(post_id).await {
        Ok(detail) => {
            let model = PostDetailViewModel::new(
                &detail.post,
                detail.author_post_count,
                &detail.comments,
                Some(user),
            )
            .with_comment_error(&form.text, message);
            render_detail(chrome, model, StatusCode::OK)
        }
        Err(err) => error_page(err, chrome),
    }
}

/// Show the authoring form again with the rejected input and its error.
async fn rerender_form(
    state: &HttpState,
    chrome: LayoutChrome,
    editing: Option<(&UserRecord, i64)>,
    text: &str,
    group_id: Option<i64>,
    errors: PostFormErrors,
) -> Response {
    let result = async {
        let groups: Vec<GroupRecord> = state.posts.list_groups().await?;
        let model = match editing {
            Some((user, post_id)) => {
                let post = state.posts.load_for_edit(user, post_id).await?;
                PostFormViewModel::edit(&post, &groups)
            }
            None => PostFormViewModel::create(&groups),
        };
        Ok::<_, AppError>(model.with_submission(text, group_id).with_errors(errors))
    }
    .await;

    match result {
        Ok(model) => render_form(chrome, model),
        Err(err) => error_page(err, chrome),
    }
}

fn render_form(chrome: LayoutChrome, model: PostFormViewModel) -> Response {
    let title = model.title.clone();
    render_template_response(
        PostFormTemplate {
            view: LayoutContext::new(chrome.with_title(title), model),
        },
        StatusCode::OK,
    )
}

fn render_detail(chrome: LayoutChrome, model: PostDetailViewModel, status: StatusCode) -> Response {
    let title = model.title.clone();
    render_template_response(
        PostDetailTemplate {
            view: LayoutContext::new(chrome.with_title(title), model),
        },
        status,
    )
}
