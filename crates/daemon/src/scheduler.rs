//! Sync scheduler that runs reconciliation cycles on a configurable interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use dirsync_core::errors::SyncError;
use dirsync_core::sync_engine::SyncEngine;

/// Tracks aggregate statistics across sync cycles.
#[derive(Default)]
pub struct SchedulerStats {
    pub total_cycles: AtomicU64,
    pub total_mutations: AtomicU64,
    pub total_errors: AtomicU64,
    pub consecutive_errors: AtomicU64,
}

/// The sync scheduler.
///
/// The first cycle starts immediately. A tick that fires while a cycle is
/// still running is skipped rather than queued.
pub struct Scheduler {
    sync_engine: Arc<SyncEngine>,
    poll_interval: Duration,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new(sync_engine: Arc<SyncEngine>, poll_interval: Duration) -> Self {
        Self {
            sync_engine,
            poll_interval,
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    /// Main scheduler loop. Returns once `shutdown` is notified.
    pub async fn run(&mut self, shutdown: Arc<Notify>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "scheduler started"
        );

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.notified() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&self) {
        let cycle_num = self.stats.total_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        info!(cycle = cycle_num, "starting sync cycle");

        match self.sync_engine.run_sync_cycle().await {
            Ok(stats) => {
                self.stats.consecutive_errors.store(0, Ordering::SeqCst);
                let mutations = stats.mutations() as u64;
                let total = self
                    .stats
                    .total_mutations
                    .fetch_add(mutations, Ordering::SeqCst)
                    + mutations;
                info!(
                    cycle = cycle_num,
                    mutations,
                    total_mutations = total,
                    started_at = %stats.started_at,
                    completed_at = stats.completed_at.as_deref().unwrap_or(""),
                    "sync cycle completed successfully"
                );
            }
            Err(SyncError::AlreadyRunning { started_at }) => {
                warn!(
                    cycle = cycle_num,
                    %started_at,
                    "skipping sync cycle: previous cycle still running"
                );
            }
            Err(e) => {
                let errors = self.stats.total_errors.fetch_add(1, Ordering::SeqCst) + 1;
                let consecutive = self.stats.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                error!(
                    cycle = cycle_num,
                    error = %e,
                    total_errors = errors,
                    consecutive_errors = consecutive,
                    "sync cycle failed"
                );
            }
        }
    }
}
