use std::sync::Arc;

use crate::application::{groups::GroupAdminService, repos::HealthRepo};
use crate::cache::CacheTrigger;

#[derive(Clone)]
pub struct AdminState {
    /// `None` when the page cache is disabled.
    pub cache_trigger: Option<Arc<CacheTrigger>>,
    pub groups: Arc<GroupAdminService>,
    pub health: Arc<dyn HealthRepo>,
}
