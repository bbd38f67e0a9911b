//! Per-group membership reconciliation.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::users::UserSyncResult;
use crate::directory::{SourceDirectory, TargetDirectory};
use crate::errors::SyncError;
use crate::models::{DirectoryGroup, DirectoryUser, GroupMembership, SourceGroup, SourceMember};

/// Mutations applied to a single group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipOutcome {
    pub added: usize,
    pub removed: usize,
}

/// The diff between desired and current membership of one group.
#[derive(Debug, Default)]
pub struct MembershipPlan<'a> {
    pub removals: Vec<&'a GroupMembership>,
    pub additions: Vec<&'a DirectoryUser>,
}

impl MembershipPlan<'_> {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }
}

/// Diff source membership against target membership.
///
/// Source members that are not known target users are left out of the
/// desired set entirely. A target membership is removed when its member
/// cannot be resolved or is not desired; everything else is confirmed.
pub fn plan_membership<'a>(
    desired: &[SourceMember],
    current: &'a [GroupMembership],
    users: &'a UserSyncResult,
) -> MembershipPlan<'a> {
    let mut wanted: BTreeMap<&str, &'a DirectoryUser> = BTreeMap::new();
    for member in desired {
        match users.by_username(&member.email) {
            Some(user) => {
                wanted.insert(user.username.as_str(), user);
            }
            None => debug!(email = %member.email, "member not in target user index, skipping"),
        }
    }

    let mut plan = MembershipPlan::default();
    for membership in current {
        match users.index().resolve_member(membership) {
            Ok(user) => {
                if wanted.remove(user.username.as_str()).is_none() {
                    plan.removals.push(membership);
                }
            }
            Err(e) => {
                warn!(error = %e, "unresolvable membership, removing");
                plan.removals.push(membership);
            }
        }
    }
    plan.additions = wanted.into_values().collect();
    plan
}

/// Converge the membership of `target_group` on that of `source_group`.
///
/// A missing source group means nobody is desired. Removals are applied
/// before additions, and the first failed mutation aborts the group.
pub async fn reconcile_membership(
    source: &dyn SourceDirectory,
    target: &dyn TargetDirectory,
    source_group: Option<&SourceGroup>,
    target_group: &DirectoryGroup,
    users: &UserSyncResult,
) -> Result<MembershipOutcome, SyncError> {
    let group = target_group.display_name.as_str();

    let desired = match source_group {
        Some(g) => source
            .list_group_members(g)
            .await
            .map_err(|source| SyncError::SourceFetch {
                what: "group members",
                source,
            })?,
        None => Vec::new(),
    };

    let current =
        target
            .list_group_members(target_group)
            .await
            .map_err(|source| SyncError::TargetFetch {
                what: "group memberships",
                source,
            })?;

    let plan = plan_membership(&desired, &current, users);
    if plan.is_empty() {
        debug!(group, members = current.len(), "membership up to date");
        return Ok(MembershipOutcome::default());
    }

    let mut outcome = MembershipOutcome::default();
    for membership in &plan.removals {
        target
            .remove_membership(membership)
            .await
            .map_err(|source| SyncError::MembershipRemoval {
                group: group.to_string(),
                membership_id: membership.id.clone(),
                source,
            })?;
        info!(group, member = %membership.member, "removed membership");
        outcome.removed += 1;
    }

    for user in &plan.additions {
        target
            .add_membership(user, target_group)
            .await
            .map_err(|source| SyncError::MembershipAddition {
                group: group.to_string(),
                username: user.username.clone(),
                source,
            })?;
        info!(group, username = %user.username, "added membership");
        outcome.added += 1;
    }

    Ok(outcome)
}
