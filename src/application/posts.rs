//! Post and comment mutations, plus the read models of the post pages.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::error::AppError;
use crate::application::media::{ImageUpload, MediaStore, looks_like_image};
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostFilter, PostsRepo,
    PostsWriteRepo, UpdatePostParams,
};
use crate::cache::CacheTrigger;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::posts::validate_text;

const UNKNOWN_GROUP_MESSAGE: &str = "Select a valid choice.";
const NOT_AN_IMAGE_MESSAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Submitted post form, before validation.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
    pub author_post_count: u64,
}

#[derive(Clone)]
pub struct PostService {
    groups: Arc<dyn GroupsRepo>,
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    comments: Arc<dyn CommentsRepo>,
    media: Arc<dyn MediaStore>,
    trigger: Option<Arc<CacheTrigger>>,
}

impl PostService {
    pub fn new(
        groups: Arc<dyn GroupsRepo>,
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        comments: Arc<dyn CommentsRepo>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            groups,
            posts,
            writer,
            comments,
            media,
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, AppError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn load_detail(&self, post_id: i64) -> Result<PostDetail, AppError> {
        let post = self.find(post_id).await?;
        let comments = self.comments.list_comments(post.id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostFilter::Author(post.author.id))
            .await?;
        Ok(PostDetail {
            post,
            comments,
            author_post_count,
        })
    }

    /// The post, provided `requester` may change it.
    pub async fn load_for_edit(
        &self,
        requester: &UserRecord,
        post_id: i64,
    ) -> Result<PostRecord, AppError> {
        let post = self.find(post_id).await?;
        if !post.is_authored_by(requester.id) {
            return Err(AppError::forbidden("edit post"));
        }
        Ok(post)
    }

    pub async fn create_post(
        &self,
        author: &UserRecord,
        draft: PostDraft,
    ) -> Result<PostRecord, AppError> {
        let text = validate_text("text", &draft.text)?;
        let group_id = self.check_group(draft.group_id).await?;
        check_image(draft.image.as_ref())?;

        let image = self.store_image(draft.image).await?;
        let params = CreatePostParams {
            author_id: author.id,
            text,
            group_id,
            image: image.clone(),
        };
        let post = match self.writer.create_post(params).await {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(post_id = post.id, author = %author.username, "post created");
        if let Some(trigger) = &self.trigger {
            trigger.post_created(&post).await;
        }
        Ok(post)
    }

    /// Replace text, group and optionally the image; the timestamp is kept.
    pub async fn edit_post(
        &self,
        requester: &UserRecord,
        post_id: i64,
        draft: PostDraft,
    ) -> Result<PostRecord, AppError> {
        let before = self.load_for_edit(requester, post_id).await?;
        let text = validate_text("text", &draft.text)?;
        let group_id = self.check_group(draft.group_id).await?;
        check_image(draft.image.as_ref())?;

        let uploaded = self.store_image(draft.image).await?;
        let params = UpdatePostParams {
            id: before.id,
            text,
            group_id,
            image: uploaded.clone().or_else(|| before.image.clone()),
        };
        let after = match self.writer.update_post(params).await {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(uploaded.as_deref()).await;
                return Err(err.into());
            }
        };

        if uploaded.is_some() {
            self.discard_image(before.image.as_deref()).await;
        }

        info!(post_id = after.id, author = %requester.username, "post edited");
        if let Some(trigger) = &self.trigger {
            trigger.post_edited(&before, &after).await;
        }
        Ok(after)
    }

    /// Remove the post with its comments and image.
    pub async fn delete_post(
        &self,
        requester: &UserRecord,
        post_id: i64,
    ) -> Result<PostRecord, AppError> {
        let post = self.find(post_id).await?;
        if !post.is_authored_by(requester.id) {
            return Err(AppError::forbidden("delete post"));
        }

        self.writer.delete_post(post.id).await?;
        self.discard_image(post.image.as_deref()).await;

        info!(post_id = post.id, author = %requester.username, "post deleted");
        if let Some(trigger) = &self.trigger {
            trigger.post_deleted(&post).await;
        }
        Ok(post)
    }

    /// Comments never touch cached feed pages.
    pub async fn add_comment(
        &self,
        author: &UserRecord,
        post_id: i64,
        text: &str,
    ) -> Result<CommentRecord, AppError> {
        let post = self.find(post_id).await?;
        let text = validate_text("text", text)?;
        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;
        info!(post_id = post.id, comment_id = comment.id, "comment added");
        Ok(comment)
    }

    async fn find(&self, post_id: i64) -> Result<PostRecord, AppError> {
        self.posts
            .find_post_by_id(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post"))
    }

    async fn check_group(&self, group_id: Option<i64>) -> Result<Option<i64>, AppError> {
        let Some(id) = group_id else {
            return Ok(None);
        };
        match self.groups.find_group_by_id(id).await? {
            Some(group) => Ok(Some(group.id)),
            None => Err(AppError::validation("group", UNKNOWN_GROUP_MESSAGE)),
        }
    }

    async fn store_image(&self, image: Option<ImageUpload>) -> Result<Option<String>, AppError> {
        let Some(image) = image else {
            return Ok(None);
        };
        let path = self.media.store_image(&image.filename, image.data).await?;
        Ok(Some(path))
    }

    async fn discard_image(&self, stored_path: Option<&str>) {
        let Some(path) = stored_path else {
            return;
        };
        if let Err(err) = self.media.remove(path).await {
            warn!(path, error = %err, "failed to remove stored image");
        }
    }
}

fn check_image(image: Option<&ImageUpload>) -> Result<(), AppError> {
    match image {
        Some(upload) if !looks_like_image(&upload.data) => {
            Err(AppError::validation("image", NOT_AN_IMAGE_MESSAGE))
        }
        _ => Ok(()),
    }
}
