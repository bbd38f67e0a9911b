//! dirsync core library.
//!
//! This crate keeps a target identity store converged with a source
//! directory: configuration, directory adapters, the reconciliation
//! stages for users, groups and memberships, and the sync engine that
//! runs them in order.

pub mod config;
pub mod directory;
pub mod errors;
pub mod models;
pub mod reconcile;
pub mod sync_engine;

// Re-exports for convenience.
pub use config::AppConfig;
pub use directory::{
    GoogleAuth, GoogleDirectory, ScimTarget, ServiceAccountAuth, SourceDirectory, TargetDirectory,
};
pub use reconcile::{IgnoreFilters, Reconciler, UserSyncResult};
pub use sync_engine::{SyncEngine, SyncStats};
