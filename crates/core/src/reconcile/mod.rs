//! The reconciliation engine.
//!
//! A run is three ordered stages: users, then groups (with per-group
//! membership), then the pending user deletions collected in the first
//! stage. [`SyncEngine`](crate::sync_engine::SyncEngine) drives them.

pub mod filter;
pub mod groups;
pub mod index;
pub mod membership;
pub mod users;

use std::sync::Arc;

use crate::directory::{SourceDirectory, TargetDirectory};

pub use filter::IgnoreFilters;
pub use index::IdentityIndex;
pub use membership::{plan_membership, reconcile_membership, MembershipOutcome, MembershipPlan};
pub use users::{new_directory_user, UserSyncResult};

/// Holds the two adapters and the filters shared by every stage.
#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn SourceDirectory>,
    target: Arc<dyn TargetDirectory>,
    filters: IgnoreFilters,
    membership_concurrency: usize,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn SourceDirectory>,
        target: Arc<dyn TargetDirectory>,
        filters: IgnoreFilters,
        membership_concurrency: usize,
    ) -> Self {
        Self {
            source,
            target,
            filters,
            membership_concurrency: membership_concurrency.max(1),
        }
    }
}
