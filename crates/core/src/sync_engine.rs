//! Directory synchronization engine.
//!
//! The [`SyncEngine`] runs one reconciliation pass per call:
//!
//! 1. Reconcile users, collecting tombstoned and suspended ones.
//! 2. Reconcile groups, converging each surviving group's membership.
//! 3. Delete the groups that vanished from the source.
//! 4. Delete the users collected in step 1.
//!
//! A lock mechanism prevents concurrent sync cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::directory::{SourceDirectory, TargetDirectory};
use crate::errors::SyncError;
use crate::reconcile::{IgnoreFilters, Reconciler};

/// Statistics from a single sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub users_created: usize,
    pub users_create_failed: usize,
    pub users_deleted: usize,
    pub users_delete_failed: usize,
    pub groups_created: usize,
    pub groups_create_failed: usize,
    pub groups_deleted: usize,
    pub memberships_added: usize,
    pub memberships_removed: usize,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl SyncStats {
    /// Number of successful mutations applied to the target.
    pub fn mutations(&self) -> usize {
        self.users_created
            + self.users_deleted
            + self.groups_created
            + self.groups_deleted
            + self.memberships_added
            + self.memberships_removed
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The core sync engine that orchestrates reconciliation runs.
pub struct SyncEngine {
    config: SyncConfig,
    reconciler: Reconciler,
    running: Arc<AtomicBool>,
    current_run: Mutex<Option<String>>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn SourceDirectory>,
        target: Arc<dyn TargetDirectory>,
    ) -> Self {
        let filters = IgnoreFilters::from_config(&config);
        let reconciler = Reconciler::new(source, target, filters, config.membership_concurrency);
        Self {
            config,
            reconciler,
            running: Arc::new(AtomicBool::new(false)),
            current_run: Mutex::new(None),
        }
    }

    /// Check if a sync cycle is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Execute one complete reconciliation run.
    ///
    /// Per-entity creation and user deletion failures are counted in the
    /// returned stats. Listing failures, group deletion failures and
    /// membership failures abort the run with an error.
    ///
    /// The sync lock is released via a drop guard so it is freed even if
    /// the cycle panics.
    pub async fn run_sync_cycle(&self) -> Result<SyncStats, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let started_at = self
                .current_run
                .lock()
                .ok()
                .and_then(|slot| slot.clone())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(SyncError::AlreadyRunning { started_at });
        }

        let _guard = SyncLockGuard(self.running.clone());

        let mut stats = SyncStats {
            started_at: Utc::now().to_rfc3339(),
            ..Default::default()
        };
        if let Ok(mut slot) = self.current_run.lock() {
            *slot = Some(stats.started_at.clone());
        }

        info!(started_at = %stats.started_at, "sync cycle starting");
        let result = self.do_sync_cycle(&mut stats).await;
        stats.completed_at = Some(Utc::now().to_rfc3339());

        match &result {
            Ok(()) => info!(
                users_created = stats.users_created,
                users_deleted = stats.users_deleted,
                groups_created = stats.groups_created,
                groups_deleted = stats.groups_deleted,
                memberships_added = stats.memberships_added,
                memberships_removed = stats.memberships_removed,
                failures = stats.users_create_failed
                    + stats.users_delete_failed
                    + stats.groups_create_failed,
                "sync cycle complete"
            ),
            Err(e) => error!(error = %e, "sync cycle failed"),
        }

        if let Ok(mut slot) = self.current_run.lock() {
            *slot = None;
        }
        result.map(|()| stats)
    }

    // -----------------------------------------------------------------------
    // Inner sync cycle logic
    // -----------------------------------------------------------------------

    async fn do_sync_cycle(&self, stats: &mut SyncStats) -> Result<(), SyncError> {
        let users = self
            .reconciler
            .reconcile_users(&self.config.user_match, stats)
            .await?;
        let users = Arc::new(users);

        self.reconciler
            .reconcile_groups(&self.config.group_match, Arc::clone(&users), stats)
            .await?;

        self.reconciler
            .remove_users(users.pending_deletion(), stats)
            .await;
        Ok(())
    }
}

/// Clears the running flag when dropped.
struct SyncLockGuard(Arc<AtomicBool>);

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
