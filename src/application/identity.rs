//! Viewer identity as asserted by the fronting authentication proxy.

use std::sync::Arc;

use crate::application::error::AppError;
use crate::application::repos::{UpsertUserParams, UsersRepo};
use crate::domain::entities::UserRecord;

/// Who is looking at the page.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    user: Option<UserRecord>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn authenticated(user: UserRecord) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UsersRepo>,
}

impl IdentityService {
    pub fn new(users: Arc<dyn UsersRepo>) -> Self {
        Self { users }
    }

    /// Record the asserted user and return it. A blank display name falls back
    /// to the username.
    pub async fn recognise(
        &self,
        username: &str,
        display_name: Option<&str>,
    ) -> Result<Viewer, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(Viewer::anonymous());
        }
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(username);

        if let Some(existing) = self.users.find_user_by_username(username).await? {
            if existing.display_name == display_name {
                return Ok(Viewer::authenticated(existing));
            }
        }

        let user = self
            .users
            .upsert_user(UpsertUserParams {
                username: username.to_string(),
                display_name: display_name.to_string(),
            })
            .await?;
        Ok(Viewer::authenticated(user))
    }
}
