//! Ignore-list filtering.
//!
//! The group ignore list only gates creation. Ignored groups that already
//! exist in the target are still deletion candidates unless
//! `protect_ignored_groups` is switched on.

use std::collections::HashSet;

use crate::config::SyncConfig;
use crate::models::SourceGroup;

#[derive(Debug, Clone, Default)]
pub struct IgnoreFilters {
    users: HashSet<String>,
    groups: HashSet<String>,
    protect_ignored_groups: bool,
}

impl IgnoreFilters {
    pub fn new<U, G>(users: U, groups: G) -> Self
    where
        U: IntoIterator<Item = String>,
        G: IntoIterator<Item = String>,
    {
        Self {
            users: users.into_iter().collect(),
            groups: groups.into_iter().collect(),
            protect_ignored_groups: false,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        let mut filters = Self::new(
            config.ignore_users.iter().cloned(),
            config.ignore_groups.iter().cloned(),
        );
        filters.protect_ignored_groups = config.protect_ignored_groups;
        filters
    }

    pub fn with_protected_groups(mut self, protect: bool) -> Self {
        self.protect_ignored_groups = protect;
        self
    }

    pub fn ignores_user(&self, username: &str) -> bool {
        self.users.contains(username)
    }

    /// A source group is ignored when either its email or its name is listed.
    pub fn ignores_group(&self, group: &SourceGroup) -> bool {
        self.groups.contains(&group.email) || self.groups.contains(&group.name)
    }

    /// Whether a target group must be kept out of the deletion set.
    pub fn protects_group(&self, display_name: &str) -> bool {
        self.protect_ignored_groups && self.groups.contains(display_name)
    }
}
