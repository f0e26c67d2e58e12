//! Administrator-managed groups.

use std::sync::Arc;

use tracing::info;

use crate::application::error::AppError;
use crate::application::repos::{CreateGroupParams, GroupsWriteRepo};
use crate::cache::CacheTrigger;
use crate::domain::entities::GroupRecord;
use crate::domain::slug::{derive_slug, is_valid_slug};

pub const GROUP_TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub slug: Option<String>,
    pub title: String,
    pub description: String,
}

#[derive(Clone)]
pub struct GroupAdminService {
    groups: Arc<dyn GroupsWriteRepo>,
    trigger: Option<Arc<CacheTrigger>>,
}

impl GroupAdminService {
    pub fn new(groups: Arc<dyn GroupsWriteRepo>) -> Self {
        Self {
            groups,
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// A duplicate slug surfaces as [`crate::application::repos::RepoError::Duplicate`].
    pub async fn create_group(&self, input: NewGroup) -> Result<GroupRecord, AppError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("title", "Title must not be empty."));
        }
        if title.chars().count() > GROUP_TITLE_MAX_CHARS {
            return Err(AppError::validation(
                "title",
                format!("Title must be at most {GROUP_TITLE_MAX_CHARS} characters."),
            ));
        }

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                if !is_valid_slug(slug) {
                    return Err(AppError::validation(
                        "slug",
                        "Slug may only contain lowercase letters, digits, hyphens and underscores.",
                    ));
                }
                slug.to_string()
            }
            _ => derive_slug(title).map_err(|err| AppError::validation("slug", err.to_string()))?,
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                slug,
                title: title.to_string(),
                description: input.description.trim().to_string(),
            })
            .await?;
        info!(slug = %group.slug, "group created");
        Ok(group)
    }

    /// Posts of the group stay, ungrouped. Every cached page may show the
    /// group's label, so the whole cache goes.
    pub async fn delete_group(&self, slug: &str) -> Result<(), AppError> {
        if !self.groups.delete_group(slug).await? {
            return Err(AppError::not_found("group"));
        }
        info!(slug, "group deleted");
        if let Some(trigger) = &self.trigger {
            // Already logged by the trigger; the deletion itself stands.
            let _ = trigger.clear_all("group_deleted").await;
        }
        Ok(())
    }
}
