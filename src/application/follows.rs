//! Follow edges between readers and authors.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    /// Following yourself is accepted and ignored.
    SelfFollow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        user: &UserRecord,
        target_username: &str,
    ) -> Result<FollowOutcome, AppError> {
        let author = self.target(target_username).await?;
        if author.id == user.id {
            debug!(user = %user.username, "ignoring self-follow");
            return Ok(FollowOutcome::SelfFollow);
        }

        match self.follows.create_follow(user.id, author.id).await {
            Ok(_) => {
                info!(user = %user.username, author = %author.username, "follow created");
                Ok(FollowOutcome::Followed)
            }
            // The unique constraint settles concurrent duplicates.
            Err(RepoError::Duplicate { .. }) => Ok(FollowOutcome::AlreadyFollowing),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn unfollow(
        &self,
        user: &UserRecord,
        target_username: &str,
    ) -> Result<UnfollowOutcome, AppError> {
        let author = self.target(target_username).await?;
        if self.follows.delete_follow(user.id, author.id).await? {
            info!(user = %user.username, author = %author.username, "follow removed");
            Ok(UnfollowOutcome::Unfollowed)
        } else {
            Ok(UnfollowOutcome::NotFollowing)
        }
    }

    pub async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, AppError> {
        Ok(self.follows.is_following(user_id, author_id).await?)
    }

    async fn target(&self, username: &str) -> Result<UserRecord, AppError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }
}
