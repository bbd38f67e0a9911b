//! Group reconciliation and the membership worker pool.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::membership::{reconcile_membership, MembershipOutcome};
use super::users::UserSyncResult;
use super::Reconciler;
use crate::errors::SyncError;
use crate::models::{DirectoryGroup, SourceGroup};
use crate::sync_engine::SyncStats;

type MembershipTaskResult = Result<Option<(String, MembershipOutcome)>, SyncError>;

impl Reconciler {
    /// Create missing groups, converge the membership of every surviving
    /// group, then delete the groups that no longer exist in the source.
    ///
    /// Group deletions only start once every membership task has finished.
    pub async fn reconcile_groups(
        &self,
        query: &str,
        users: Arc<UserSyncResult>,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        debug!("get all groups from target");
        let target_groups = self
            .target
            .list_groups()
            .await
            .map_err(|source| SyncError::TargetFetch {
                what: "groups",
                source,
            })?;

        let mut working: BTreeMap<String, DirectoryGroup> = BTreeMap::new();
        for group in target_groups {
            if let Some(previous) = working.insert(group.display_name.clone(), group) {
                warn!(group = %previous.display_name, "duplicate group name in target listing");
            }
        }

        debug!(query, "get groups from source");
        let source_groups = self
            .source
            .list_groups(query)
            .await
            .map_err(|source| SyncError::SourceFetch {
                what: "groups",
                source,
            })?;

        let mut source_index: HashMap<String, SourceGroup> = HashMap::new();
        for group in source_groups {
            if self.filters.ignores_group(&group) {
                debug!(group = %group.name, "ignoring group on ignore list");
                continue;
            }
            if !working.contains_key(&group.name) {
                match self
                    .target
                    .create_group(&group.name, &group.description)
                    .await
                {
                    Ok(created) => {
                        info!(group = %group.name, id = %created.id, "created group");
                        stats.groups_created += 1;
                        working.insert(created.display_name.clone(), created);
                    }
                    Err(e) => {
                        error!(group = %group.name, error = %e, "can't create group");
                        stats.groups_create_failed += 1;
                    }
                }
            }
            source_index.insert(group.name.clone(), group);
        }

        let stale: Vec<String> = working
            .keys()
            .filter(|name| !source_index.contains_key(*name))
            .cloned()
            .collect();
        let mut to_delete = Vec::new();
        for name in stale {
            let Some(group) = working.remove(&name) else {
                continue;
            };
            if self.filters.protects_group(&name) {
                debug!(group = %name, "group protected by ignore list, leaving untouched");
                continue;
            }
            to_delete.push(group);
        }

        self.reconcile_all_memberships(working, &source_index, users, stats)
            .await?;

        for group in &to_delete {
            self.target
                .delete_group(group)
                .await
                .map_err(|source| SyncError::GroupDeletion {
                    group: group.display_name.clone(),
                    source,
                })?;
            warn!(group = %group.display_name, "deleted group");
            stats.groups_deleted += 1;
        }

        Ok(())
    }

    /// Fan membership reconciliation out over a bounded pool of tasks.
    ///
    /// Groups are dispatched in display-name order. Once any group fails,
    /// tasks that have not started yet skip their work and the first error
    /// is returned after in-flight tasks are aborted.
    async fn reconcile_all_memberships(
        &self,
        groups: BTreeMap<String, DirectoryGroup>,
        source_index: &HashMap<String, SourceGroup>,
        users: Arc<UserSyncResult>,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.membership_concurrency.max(1)));
        let failed = Arc::new(AtomicBool::new(false));
        let mut tasks: JoinSet<MembershipTaskResult> = JoinSet::new();

        for (name, target_group) in groups {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Worker(e.to_string()))?;

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = absorb(joined, stats) {
                    tasks.abort_all();
                    return Err(e);
                }
            }

            let source_group = source_index.get(&name).cloned();
            let source = Arc::clone(&self.source);
            let target = Arc::clone(&self.target);
            let users = Arc::clone(&users);
            let failed = Arc::clone(&failed);

            tasks.spawn(async move {
                let _permit = permit;
                if failed.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                let result = reconcile_membership(
                    source.as_ref(),
                    target.as_ref(),
                    source_group.as_ref(),
                    &target_group,
                    &users,
                )
                .await;
                match result {
                    Ok(outcome) => Ok(Some((name, outcome))),
                    Err(e) => {
                        failed.store(true, Ordering::SeqCst);
                        Err(e)
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = absorb(joined, stats) {
                tasks.abort_all();
                return Err(e);
            }
        }
        Ok(())
    }
}

fn absorb(
    joined: Result<MembershipTaskResult, JoinError>,
    stats: &mut SyncStats,
) -> Result<(), SyncError> {
    match joined {
        Ok(Ok(Some((group, outcome)))) => {
            if outcome != MembershipOutcome::default() {
                debug!(
                    group = %group,
                    added = outcome.added,
                    removed = outcome.removed,
                    "group membership reconciled"
                );
            }
            stats.memberships_added += outcome.added;
            stats.memberships_removed += outcome.removed;
            Ok(())
        }
        Ok(Ok(None)) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "membership reconciliation failed");
            Err(e)
        }
        Err(e) => Err(SyncError::Worker(e.to_string())),
    }
}
