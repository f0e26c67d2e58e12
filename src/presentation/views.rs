use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::{PageWindow, Paginated};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};

/// Characters left unescaped inside a single path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome.with_title("Page not found"), ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

pub fn render_forbidden_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome.with_title("Access denied"), ErrorPageView::forbidden());
    let mut response = render_template_response(ForbiddenTemplate { view }, StatusCode::FORBIDDEN);
    ErrorReport::from_message(
        "presentation::views::render_forbidden_response",
        StatusCode::FORBIDDEN,
        "Action not permitted",
    )
    .attach(&mut response);
    response
}

pub fn post_href(id: i64) -> String {
    format!("/posts/{id}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{}/", utf8_percent_encode(slug, SEGMENT))
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{}/", utf8_percent_encode(username, SEGMENT))
}

pub fn media_href(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

fn display_timestamp(value: OffsetDateTime) -> String {
    let format = format_description!("[day] [month repr:short] [year], [hour]:[minute]");
    value
        .format(&format)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

fn iso_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
}

#[derive(Clone)]
pub struct NavigationView {
    pub entries: Vec<NavigationLinkView>,
}

/// Signed-in viewer as shown in the header.
#[derive(Clone)]
pub struct ViewerBadge {
    pub username: String,
    pub display_name: String,
    pub profile_href: String,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
}

/// Per-request page frame. Built for every response and never cached.
#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub viewer: Option<ViewerBadge>,
    pub meta: PageMetaView,
}

impl LayoutChrome {
    pub fn new(viewer: Option<&UserRecord>, login_path: &str) -> Self {
        let mut entries = vec![NavigationLinkView {
            label: "Home".to_string(),
            href: "/".to_string(),
        }];
        match viewer {
            Some(_) => {
                entries.push(NavigationLinkView {
                    label: "Favorites".to_string(),
                    href: "/follow/".to_string(),
                });
                entries.push(NavigationLinkView {
                    label: "New post".to_string(),
                    href: "/create/".to_string(),
                });
            }
            None => entries.push(NavigationLinkView {
                label: "Log in".to_string(),
                href: login_path.to_string(),
            }),
        }

        Self {
            brand: BrandView {
                title: "Quill".to_string(),
                href: "/".to_string(),
            },
            navigation: NavigationView { entries },
            viewer: viewer.map(|user| ViewerBadge {
                username: user.username.clone(),
                display_name: user.display_name.clone(),
                profile_href: profile_href(&user.username),
            }),
            meta: PageMetaView {
                title: "Quill".to_string(),
            },
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            meta: PageMetaView {
                title: title.into(),
            },
            ..self
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub viewer: Option<ViewerBadge>,
    pub meta: PageMetaView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            navigation: chrome.navigation,
            viewer: chrome.viewer,
            meta: chrome.meta,
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupLinkView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub href: String,
    pub text: String,
    pub author_name: String,
    pub author_href: String,
    pub group: Option<GroupLinkView>,
    pub published: String,
    pub published_iso: String,
    pub image_url: Option<String>,
}

impl From<&PostRecord> for PostCard {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            href: post_href(post.id),
            text: post.text.clone(),
            author_name: post.author.display_name.clone(),
            author_href: profile_href(&post.author.username),
            group: post.group.as_ref().map(|group| GroupLinkView {
                title: group.title.clone(),
                href: group_href(&group.slug),
            }),
            published: display_timestamp(post.created_at),
            published_iso: iso_timestamp(post.created_at),
            image_url: post.image.as_deref().map(media_href),
        }
    }
}

#[derive(Clone)]
pub struct PaginationView {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
}

impl PaginationView {
    pub fn new(window: &PageWindow, base_path: &str) -> Self {
        let href = |page: u32| format!("{base_path}?page={page}");
        Self {
            current_page: window.current_page,
            total_pages: window.total_pages,
            total_count: window.total_count,
            previous_href: window.previous_page().map(href),
            next_href: window.next_page().map(href),
        }
    }

    pub fn is_paged(&self) -> bool {
        self.total_pages > 1
    }
}

/// The cacheable part of every feed page: cards plus paginator.
#[derive(Template)]
#[template(path = "partials/feed.html")]
pub struct FeedFragmentTemplate {
    pub cards: Vec<PostCard>,
    pub pagination: PaginationView,
}

impl FeedFragmentTemplate {
    pub fn new(page: &Paginated<PostRecord>, base_path: &str) -> Self {
        Self {
            cards: page.items.iter().map(PostCard::from).collect(),
            pagination: PaginationView::new(&page.window, base_path),
        }
    }
}

pub struct IndexViewModel {
    pub title: String,
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexViewModel>,
}

pub struct GroupViewModel {
    pub title: String,
    pub group_title: String,
    pub description: String,
    pub feed_html: String,
}

impl GroupViewModel {
    pub fn new(group: &GroupRecord, feed_html: String) -> Self {
        Self {
            title: format!("Posts of group {}", group.title),
            group_title: group.title.clone(),
            description: group.description.clone(),
            feed_html,
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupViewModel>,
}

#[derive(Clone)]
pub struct FollowButtonView {
    pub following: bool,
    pub href: String,
}

pub struct ProfileViewModel {
    pub title: String,
    pub display_name: String,
    pub username: String,
    pub post_count: u64,
    pub follow: Option<FollowButtonView>,
    pub feed_html: String,
}

impl ProfileViewModel {
    /// `following` is `None` when no follow button applies: anonymous viewer or own profile.
    pub fn new(
        author: &UserRecord,
        post_count: u64,
        following: Option<bool>,
        feed_html: String,
    ) -> Self {
        let base = profile_href(&author.username);
        Self {
            title: format!("Profile of {}", author.display_name),
            display_name: author.display_name.clone(),
            username: author.username.clone(),
            post_count,
            follow: following.map(|following| FollowButtonView {
                following,
                href: if following {
                    format!("{base}unfollow/")
                } else {
                    format!("{base}follow/")
                },
            }),
            feed_html,
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileViewModel>,
}

pub struct FollowViewModel {
    pub title: String,
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FollowViewModel>,
}

pub struct CommentView {
    pub author_name: String,
    pub author_href: String,
    pub text: String,
    pub published: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author_name: comment.author.display_name.clone(),
            author_href: profile_href(&comment.author.username),
            text: comment.text.clone(),
            published: display_timestamp(comment.created_at),
        }
    }
}

pub struct CommentFormView {
    pub action: String,
    pub text: String,
    pub error: Option<String>,
}

pub struct PostActionsView {
    pub edit_href: String,
    pub delete_href: String,
}

pub struct PostDetailViewModel {
    pub title: String,
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub actions: Option<PostActionsView>,
    pub comment_form: Option<CommentFormView>,
}

impl PostDetailViewModel {
    pub fn new(
        post: &PostRecord,
        author_post_count: u64,
        comments: &[CommentRecord],
        viewer: Option<&UserRecord>,
    ) -> Self {
        let href = post_href(post.id);
        let actions = viewer
            .filter(|user| post.is_authored_by(user.id))
            .map(|_| PostActionsView {
                edit_href: format!("{href}edit/"),
                delete_href: format!("{href}delete/"),
            });
        let comment_form = viewer.map(|_| CommentFormView {
            action: format!("{href}comment/"),
            text: String::new(),
            error: None,
        });

        Self {
            title: post.title(),
            post: PostCard::from(post),
            author_post_count,
            comments: comments.iter().map(CommentView::from).collect(),
            actions,
            comment_form,
        }
    }

    /// Re-show the comment form with the rejected input.
    pub fn with_comment_error(mut self, text: &str, message: &str) -> Self {
        if let Some(form) = self.comment_form.as_mut() {
            form.text = text.to_string();
            form.error = Some(message.to_string());
        }
        self
    }
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailViewModel>,
}

pub struct GroupOptionView {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

#[derive(Default)]
pub struct PostFormErrors {
    pub text: Option<String>,
    pub group: Option<String>,
    pub image: Option<String>,
}

impl PostFormErrors {
    pub fn for_field(field: &str, message: &str) -> Self {
        let mut errors = Self::default();
        let message = Some(message.to_string());
        match field {
            "group" => errors.group = message,
            "image" => errors.image = message,
            _ => errors.text = message,
        }
        errors
    }
}

pub struct PostFormViewModel {
    pub title: String,
    pub action: String,
    pub is_edit: bool,
    pub text: String,
    pub groups: Vec<GroupOptionView>,
    pub current_image: Option<String>,
    pub errors: PostFormErrors,
}

impl PostFormViewModel {
    pub fn create(groups: &[GroupRecord]) -> Self {
        Self {
            title: "New post".to_string(),
            action: "/create/".to_string(),
            is_edit: false,
            text: String::new(),
            groups: group_options(groups, None),
            current_image: None,
            errors: PostFormErrors::default(),
        }
    }

    pub fn edit(post: &PostRecord, groups: &[GroupRecord]) -> Self {
        Self {
            title: "Edit post".to_string(),
            action: format!("{}edit/", post_href(post.id)),
            is_edit: true,
            text: post.text.clone(),
            groups: group_options(groups, post.group.as_ref().map(|group| group.id)),
            current_image: post.image.as_deref().map(media_href),
            errors: PostFormErrors::default(),
        }
    }

    /// Keep what the author submitted when the form is shown again.
    pub fn with_submission(mut self, text: &str, group_id: Option<i64>) -> Self {
        self.text = text.to_string();
        for option in &mut self.groups {
            option.selected = Some(option.id) == group_id;
        }
        self
    }

    pub fn with_errors(self, errors: PostFormErrors) -> Self {
        Self { errors, ..self }
    }
}

fn group_options(groups: &[GroupRecord], selected: Option<i64>) -> Vec<GroupOptionView> {
    groups
        .iter()
        .map(|group| GroupOptionView {
            id: group.id,
            title: group.title.clone(),
            selected: Some(group.id) == selected,
        })
        .collect()
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormViewModel>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub primary_action: Option<ErrorAction>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            title: "Access denied".to_string(),
            message: "Only the author of this post can change it.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }
}

pub struct ErrorAction {
    pub href: String,
    pub label: String,
}

impl ErrorAction {
    pub fn home() -> Self {
        Self {
            href: "/".to_string(),
            label: "Back to home".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[derive(Template)]
#[template(path = "forbidden.html")]
pub struct ForbiddenTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
