//! User reconciliation.
//!
//! Only existence and suspension drive actions. Attributes of users that
//! already exist in the target are never diffed or updated.

use tracing::{debug, error, info, warn};

use super::index::IdentityIndex;
use super::Reconciler;
use crate::errors::SyncError;
use crate::models::{DirectoryUser, Email, ExternalId, SourceUser};
use crate::sync_engine::SyncStats;

/// Output of user reconciliation, consumed by the group stage and by the
/// final deletion pass.
#[derive(Debug, Clone, Default)]
pub struct UserSyncResult {
    index: IdentityIndex,
    pending_deletion: Vec<DirectoryUser>,
}

impl UserSyncResult {
    pub fn new(index: IdentityIndex) -> Self {
        Self {
            index,
            pending_deletion: Vec::new(),
        }
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    pub fn by_username(&self, username: &str) -> Option<&DirectoryUser> {
        self.index.by_username(username)
    }

    /// Users to delete once group and membership reconciliation is done.
    pub fn pending_deletion(&self) -> &[DirectoryUser] {
        &self.pending_deletion
    }

    /// Schedule a user for deletion; a username is only scheduled once.
    fn mark_for_deletion(&mut self, user: DirectoryUser) -> bool {
        if self
            .pending_deletion
            .iter()
            .any(|u| u.username == user.username)
        {
            return false;
        }
        self.pending_deletion.push(user);
        true
    }
}

/// Build the target representation of a source user that does not exist yet.
pub fn new_directory_user(user: &SourceUser, issuer: &str) -> DirectoryUser {
    DirectoryUser {
        id: None,
        username: user.primary_email.clone(),
        display_name: [user.given_name.as_str(), user.family_name.as_str()].join(" "),
        given_name: user.given_name.clone(),
        family_name: user.family_name.clone(),
        emails: vec![Email {
            value: user.primary_email.clone(),
            kind: "work".into(),
            primary: true,
        }],
        external_id: Some(ExternalId {
            issuer: issuer.to_string(),
            id: user.id.clone(),
        }),
    }
}

impl Reconciler {
    /// Create missing users and collect the ones to delete.
    ///
    /// Listing failures on either side abort the run. A failed creation is
    /// logged and skipped; that user is simply absent for the rest of the run.
    pub async fn reconcile_users(
        &self,
        query: &str,
        stats: &mut SyncStats,
    ) -> Result<UserSyncResult, SyncError> {
        debug!("get all users from target");
        let target_users = self
            .target
            .list_users()
            .await
            .map_err(|source| SyncError::TargetFetch {
                what: "users",
                source,
            })?;
        let mut result = UserSyncResult::new(IdentityIndex::build(target_users));
        info!(count = result.index.len(), "indexed target users");

        debug!("get deleted users from source");
        let deleted = self
            .source
            .list_deleted_users()
            .await
            .map_err(|source| SyncError::SourceFetch {
                what: "deleted users",
                source,
            })?;

        for u in &deleted {
            let email = u.primary_email.as_str();
            if self.filters.ignores_user(email) {
                debug!(email, "ignoring deleted user on ignore list");
                continue;
            }
            match result.index.by_username(email).cloned() {
                Some(existing) => {
                    warn!(email, "user deleted in source, scheduled for deletion");
                    result.mark_for_deletion(existing);
                }
                None => debug!(email, "user already absent from target"),
            }
        }

        debug!(query, "get active users from source");
        let active = self
            .source
            .list_users(query)
            .await
            .map_err(|source| SyncError::SourceFetch {
                what: "users",
                source,
            })?;

        for u in &active {
            let email = u.primary_email.as_str();
            if self.filters.ignores_user(email) {
                debug!(email, "ignoring user on ignore list");
                continue;
            }

            match (result.index.by_username(email).cloned(), u.suspended) {
                (Some(existing), true) => {
                    warn!(email, "user suspended in source, scheduled for deletion");
                    result.mark_for_deletion(existing);
                }
                (Some(_), false) => debug!(email, "user already present"),
                (None, true) => debug!(email, "user suspended in source, not creating"),
                (None, false) => {
                    let user = new_directory_user(u, self.source.issuer());
                    match self.target.create_user(&user).await {
                        Ok(created) => {
                            info!(email, id = ?created.id, "created user");
                            stats.users_created += 1;
                            result.index.insert(created);
                        }
                        Err(e) => {
                            error!(email, error = %e, "can't create user");
                            stats.users_create_failed += 1;
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    /// Delete users scheduled during user reconciliation.
    ///
    /// Runs last, after every group has been reconciled. A failed deletion
    /// is logged and the remaining users are still processed.
    pub async fn remove_users(&self, users: &[DirectoryUser], stats: &mut SyncStats) {
        for user in users {
            match self.target.delete_user(user).await {
                Ok(()) => {
                    warn!(email = %user.username, "deleted user");
                    stats.users_deleted += 1;
                }
                Err(e) => {
                    error!(email = %user.username, error = %e, "can't delete user");
                    stats.users_delete_failed += 1;
                }
            }
        }
    }
}
