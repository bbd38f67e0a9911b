//! dirsync daemon entry point.
//!
//! Loads configuration, builds the source and target directory clients,
//! and either runs a single reconciliation pass or starts the scheduler
//! and waits for a shutdown signal.

mod scheduler;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use dirsync_core::config::AppConfig;
use dirsync_core::directory::{GoogleAuth, GoogleDirectory, ScimTarget, ServiceAccountAuth};
use dirsync_core::sync_engine::SyncEngine;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// dirsync synchronization daemon.
#[derive(Parser, Debug)]
#[command(
    name = "dirsync",
    version,
    about = "Keeps a SCIM identity store converged with a Google Workspace directory"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Run a single reconciliation pass and exit.
    #[arg(long)]
    once: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing needs the log settings, so it starts right after the file is
    // parsed and before anything that may warn.
    let mut config =
        AppConfig::load_from_file(&args.config).context("failed to load configuration file")?;
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    let _log_guard = init_tracing(&log_level, &config)?;

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables in config")?;
    config
        .validate()
        .context("configuration validation failed")?;

    // Startup banner
    info!("========================================");
    info!("  dirsync v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Source API    : {}", config.source.api_url);
    info!(
        "Source auth   : {}",
        if config.source.credentials_file.is_some() {
            "service account"
        } else {
            "static token"
        }
    );
    info!("SCIM endpoint : {}", config.target.scim_endpoint);
    info!("Poll interval : {}s", config.daemon.poll_interval_secs);
    info!("Concurrency   : {}", config.sync.membership_concurrency);
    info!("Log level     : {}", log_level);
    info!("========================================");

    config
        .require_tokens()
        .context("directory credentials are missing")?;
    let target_token = config.target.token.clone().unwrap_or_default();

    let source = GoogleDirectory::new(
        &config.source.api_url,
        &config.source.customer,
        source_auth(&config)?,
        config.sync.page_size,
        Duration::from_secs(config.source.timeout_secs),
    )
    .context("failed to build source directory client")?;
    let target = ScimTarget::new(
        &config.target.scim_endpoint,
        target_token,
        config.sync.page_size,
        Duration::from_secs(config.target.timeout_secs),
    )
    .context("failed to build SCIM client")?;

    let sync_engine = Arc::new(SyncEngine::new(
        config.sync.clone(),
        Arc::new(source),
        Arc::new(target),
    ));
    info!("Sync engine initialized");

    if args.once {
        let stats = sync_engine
            .run_sync_cycle()
            .await
            .context("sync cycle failed")?;
        info!(mutations = stats.mutations(), "single pass finished");
        return Ok(());
    }

    // Create a shutdown notify for cooperative cancellation
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let scheduler_shutdown = shutdown.clone();

    let poll_interval = Duration::from_secs(config.daemon.poll_interval_secs);
    let mut sched = scheduler::Scheduler::new(sync_engine.clone(), poll_interval);

    let scheduler_handle = tokio::spawn(async move {
        sched.run(scheduler_shutdown).await;
    });

    signals::wait_for_shutdown().await;

    info!("Shutdown signal received, stopping...");

    // notify_one stores a permit, so a scheduler busy with a cycle still
    // sees the request once the cycle returns.
    shutdown.notify_one();

    match tokio::time::timeout(Duration::from_secs(10), scheduler_handle).await {
        Ok(Ok(())) => info!("scheduler stopped gracefully"),
        Ok(Err(e)) => warn!("scheduler task error: {}", e),
        Err(_) => warn!("scheduler did not stop within 10s, forcing shutdown"),
    }

    info!("dirsync daemon stopped.");
    Ok(())
}

/// Service-account credentials when a key file is configured, otherwise the
/// static token resolved from the environment.
fn source_auth(config: &AppConfig) -> Result<GoogleAuth> {
    match config.source.credentials_file {
        Some(ref path) => {
            let subject = config.source.admin_email.clone().unwrap_or_default();
            let auth = ServiceAccountAuth::from_file(path, subject)
                .context("failed to load service account credentials")?;
            Ok(auth.into())
        }
        None => Ok(GoogleAuth::Static(
            config.source.token.clone().unwrap_or_default(),
        )),
    }
}

/// Initialize tracing to stdout, or to a daily-rotated file when
/// `daemon.log_file` is set. The returned guard must live until exit.
fn init_tracing(log_level: &str, config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(ref path) = config.daemon.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .context("daemon.log_file must name a file")?;
    std::fs::create_dir_all(dir).context("failed to create log directory")?;

    let appender = tracing_appender::rolling::daily(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}
