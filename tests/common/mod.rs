//! Shared fixtures: an in-memory store behind every repository trait and a
//! builder that wires the public and admin routers around it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use bytes::Bytes;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use quill::application::feed::FeedService;
use quill::application::follows::FollowService;
use quill::application::groups::GroupAdminService;
use quill::application::identity::IdentityService;
use quill::application::media::MediaStore;
use quill::application::posts::PostService;
use quill::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, FollowsRepo,
    GroupsRepo, GroupsWriteRepo, HealthRepo, PostFilter, PostsRepo, PostsWriteRepo, RepoError,
    UpdatePostParams, UpsertUserParams, UsersRepo,
};
use quill::cache::{
    CacheConfig, CacheError, CacheTrigger, FeedKey, FeedScope, MemoryPageCache, PageCache,
};
use quill::config::IdentitySettings;
use quill::domain::entities::{
    AuthorRef, CommentRecord, FollowRecord, GroupRecord, GroupRef, PostRecord, UserRecord,
};
use quill::infra::http::{AdminState, HttpState, build_admin_router, build_router};
use quill::infra::uploads::UploadStorage;

pub const USER_HEADER: &str = "x-remote-user";

// Smallest valid GIF89a: 1x1 transparent pixel.
pub const TINY_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

#[derive(Debug, Clone)]
struct PostRow {
    id: i64,
    author_id: Uuid,
    text: String,
    group_id: Option<i64>,
    image: Option<String>,
    created_at: OffsetDateTime,
}

#[derive(Default)]
struct StoreState {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRow>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    next_id: i64,
    clock: i64,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so ordering is deterministic.
    fn tick(&mut self) -> OffsetDateTime {
        self.clock += 1;
        OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(1_700_000_000 + self.clock)
    }

    fn author(&self, id: Uuid) -> Option<AuthorRef> {
        self.users.iter().find(|user| user.id == id).map(AuthorRef::from)
    }

    fn hydrate(&self, row: &PostRow) -> Option<PostRecord> {
        Some(PostRecord {
            id: row.id,
            text: row.text.clone(),
            created_at: row.created_at,
            author: self.author(row.author_id)?,
            group: row
                .group_id
                .and_then(|id| self.groups.iter().find(|group| group.id == id))
                .map(GroupRef::from),
            image: row.image.clone(),
        })
    }

    fn matches(&self, row: &PostRow, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(id) => row.group_id == Some(id),
            PostFilter::Author(id) => row.author_id == id,
            PostFilter::FollowedBy(viewer) => self
                .follows
                .iter()
                .any(|edge| edge.user_id == viewer && edge.author_id == row.author_id),
        }
    }

    fn feed(&self, filter: PostFilter) -> Vec<PostRecord> {
        let mut rows: Vec<&PostRow> = self
            .posts
            .iter()
            .filter(|row| self.matches(row, filter))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.into_iter().filter_map(|row| self.hydrate(row)).collect()
    }
}

/// Every repository trait over one mutex-guarded state.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, username: &str) -> UserRecord {
        let mut state = self.state.lock().unwrap();
        let created_at = state.tick();
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_name: username.to_string(),
            created_at,
        };
        state.users.push(user.clone());
        user
    }

    pub fn add_group(&self, slug: &str, title: &str) -> GroupRecord {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let created_at = state.tick();
        let group = GroupRecord {
            id,
            slug: slug.to_string(),
            title: title.to_string(),
            description: format!("About {title}"),
            created_at,
        };
        state.groups.push(group.clone());
        group
    }

    /// Insert a post without going through the service layer.
    pub fn add_post(&self, author: &UserRecord, text: &str, group: Option<&GroupRecord>) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let created_at = state.tick();
        state.posts.push(PostRow {
            id,
            author_id: author.id,
            text: text.to_string(),
            group_id: group.map(|group| group.id),
            image: None,
            created_at,
        });
        id
    }

    /// Delete a post behind the cache's back.
    pub fn remove_post_directly(&self, id: i64) {
        let mut state = self.state.lock().unwrap();
        state.posts.retain(|row| row.id != id);
        state.comments.retain(|comment| comment.post_id != id);
    }

    pub fn post_count(&self) -> usize {
        self.state.lock().unwrap().posts.len()
    }

    pub fn comment_count(&self, post_id: i64) -> usize {
        self.state
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .count()
    }

    pub fn follow_edges(&self, user: Uuid, author: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .follows
            .iter()
            .filter(|edge| edge.user_id == user && edge.author_id == author)
            .count()
    }

    pub fn post(&self, id: i64) -> Option<PostRecord> {
        let state = self.state.lock().unwrap();
        state
            .posts
            .iter()
            .find(|row| row.id == id)
            .and_then(|row| state.hydrate(row))
    }

    pub fn user(&self, username: &str) -> Option<UserRecord> {
        self.state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned()
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.user(username))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|user| user.id == id).cloned())
    }

    async fn upsert_user(&self, params: UpsertUserParams) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state
            .users
            .iter_mut()
            .find(|user| user.username == params.username)
        {
            user.display_name = params.display_name;
            return Ok(user.clone());
        }
        let created_at = state.tick();
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            display_name: params.display_name,
            created_at,
        };
        state.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn find_group_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.state.lock().unwrap().groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }
}

#[async_trait]
impl GroupsWriteRepo for MemoryStore {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        if state.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "post_groups_slug_key".into(),
            });
        }
        let id = state.next_id();
        let created_at = state.tick();
        let group = GroupRecord {
            id,
            slug: params.slug,
            title: params.title,
            description: params.description,
            created_at,
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_group(&self, slug: &str) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        let Some(position) = state.groups.iter().position(|group| group.slug == slug) else {
            return Ok(false);
        };
        let group = state.groups.remove(position);
        for row in state.posts.iter_mut() {
            if row.group_id == Some(group.id) {
                row.group_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, filter: PostFilter) -> Result<u64, RepoError> {
        Ok(self.state.lock().unwrap().feed(filter).len() as u64)
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .feed(filter)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find_post_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.post(id))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let created_at = state.tick();
        let row = PostRow {
            id,
            author_id: params.author_id,
            text: params.text,
            group_id: params.group_id,
            image: params.image,
            created_at,
        };
        let record = state.hydrate(&row).ok_or(RepoError::Integrity {
            message: "unknown author".into(),
        })?;
        state.posts.push(row);
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .posts
            .iter_mut()
            .find(|row| row.id == params.id)
            .ok_or(RepoError::NotFound)?;
        row.text = params.text;
        row.group_id = params.group_id;
        row.image = params.image;
        let row = row.clone();
        state.hydrate(&row).ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.lock().unwrap();
        let before = state.posts.len();
        state.posts.retain(|row| row.id != id);
        if state.posts.len() == before {
            return Err(RepoError::NotFound);
        }
        state.comments.retain(|comment| comment.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        let mut comments: Vec<CommentRecord> = state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn count_comments(&self, post_id: i64) -> Result<u64, RepoError> {
        Ok(self.comment_count(post_id) as u64)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        let author = state.author(params.author_id).ok_or(RepoError::Integrity {
            message: "unknown author".into(),
        })?;
        let id = state.next_id();
        let created_at = state.tick();
        let comment = CommentRecord {
            id,
            post_id: params.post_id,
            text: params.text,
            created_at,
            author,
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn create_follow(
        &self,
        user_id: Uuid,
        author_id: Uuid,
    ) -> Result<FollowRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        if state
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id)
        {
            return Err(RepoError::Duplicate {
                constraint: "follows_user_author_key".into(),
            });
        }
        let created_at = state.tick();
        let edge = FollowRecord {
            user_id,
            author_id,
            created_at,
        };
        state.follows.push(edge.clone());
        Ok(edge)
    }

    async fn delete_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        let before = state.follows.len();
        state
            .follows
            .retain(|edge| !(edge.user_id == user_id && edge.author_id == author_id));
        Ok(state.follows.len() != before)
    }

    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        Ok(self.follow_edges(user_id, author_id) > 0)
    }

    async fn count_follows(&self, user_id: Uuid, author_id: Uuid) -> Result<u64, RepoError> {
        Ok(self.follow_edges(user_id, author_id) as u64)
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// A cache whose every operation fails.
pub struct FailingPageCache;

#[async_trait]
impl PageCache for FailingPageCache {
    async fn get(&self, _key: &FeedKey) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn put(&self, _key: FeedKey, _body: Bytes) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn invalidate_scope(&self, _scope: &FeedScope) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }
}

pub enum CacheMode {
    Disabled,
    Memory(Duration),
    Failing,
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub cache: Option<Arc<MemoryPageCache>>,
    pub feeds: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub groups: Arc<GroupAdminService>,
    pub public: Router,
    pub admin: Router,
    _uploads: tempfile::TempDir,
}

pub struct TestAppBuilder {
    per_page: u32,
    cache: CacheMode,
}

impl TestAppBuilder {
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    pub fn build(self) -> TestApp {
        let store = MemoryStore::new();
        let uploads = tempfile::tempdir().expect("tempdir");
        let storage =
            Arc::new(UploadStorage::new(uploads.path().to_path_buf()).expect("upload storage"));
        let media: Arc<dyn MediaStore> = storage.clone();

        let (memory, page_cache): (Option<Arc<MemoryPageCache>>, Option<Arc<dyn PageCache>>) =
            match self.cache {
                CacheMode::Disabled => (None, None),
                CacheMode::Memory(ttl) => {
                    let cache = Arc::new(MemoryPageCache::new(&CacheConfig {
                        ttl,
                        ..CacheConfig::default()
                    }));
                    let shared: Arc<dyn PageCache> = cache.clone();
                    (Some(cache), Some(shared))
                }
                CacheMode::Failing => {
                    let failing: Arc<dyn PageCache> = Arc::new(FailingPageCache);
                    (None, Some(failing))
                }
            };
        let trigger = page_cache
            .clone()
            .map(|cache| Arc::new(CacheTrigger::new(cache)));

        let per_page = NonZeroU32::new(self.per_page).expect("per_page");
        let mut feeds = FeedService::new(store.clone(), store.clone(), store.clone(), per_page);
        let mut posts = PostService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            media,
        );
        let mut groups = GroupAdminService::new(store.clone());
        if let Some(cache) = page_cache {
            feeds = feeds.with_cache(cache);
        }
        if let Some(trigger) = trigger.clone() {
            posts = posts.with_trigger(trigger.clone());
            groups = groups.with_trigger(trigger);
        }

        let feeds = Arc::new(feeds);
        let posts = Arc::new(posts);
        let follows = Arc::new(FollowService::new(store.clone(), store.clone()));
        let groups = Arc::new(groups);

        let public = build_router(HttpState {
            feeds: feeds.clone(),
            posts: posts.clone(),
            follows: follows.clone(),
            identity: Arc::new(IdentityService::new(store.clone())),
            identity_settings: Arc::new(IdentitySettings::default()),
            health: store.clone(),
            upload_storage: storage,
            upload_body_limit: 1024 * 1024,
        });
        let admin = build_admin_router(AdminState {
            cache_trigger: trigger,
            groups: groups.clone(),
            health: store.clone(),
        });

        TestApp {
            store,
            cache: memory,
            feeds,
            posts,
            follows,
            groups,
            public,
            admin,
            _uploads: uploads,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            per_page: 10,
            cache: CacheMode::Memory(Duration::from_secs(20)),
        }
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        let mut request = Request::get(uri);
        if let Some(user) = user {
            request = request.header(USER_HEADER, user);
        }
        send(&self.public, request.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, user: Option<&str>, body: &str) -> Response<Body> {
        let mut request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(user) = user {
            request = request.header(USER_HEADER, user);
        }
        send(&self.public, request.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        user: &str,
        fields: &[(&str, &str)],
        image: Option<(&str, &[u8])>,
    ) -> Response<Body> {
        let (content_type, body) = multipart_body(fields, image);
        let request = Request::post(uri)
            .header(USER_HEADER, user)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        send(&self.public, request).await
    }

    /// POST with an empty body and an optional content type.
    pub async fn post_empty(
        &self,
        uri: &str,
        user: Option<&str>,
        content_type: Option<&str>,
    ) -> Response<Body> {
        let mut request = Request::post(uri);
        if let Some(user) = user {
            request = request.header(USER_HEADER, user);
        }
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        send(&self.public, request.body(Body::empty()).unwrap()).await
    }

    pub async fn admin(&self, request: Request<Body>) -> Response<Body> {
        send(&self.admin, request).await
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("router")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
}

/// Number of post cards in a rendered page.
pub fn card_count(html: &str) -> usize {
    html.matches("data-post-id=").count()
}

const BOUNDARY: &str = "quill-test-boundary";

fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}
