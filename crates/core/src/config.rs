//! TOML-based configuration system for dirsync.
//!
//! Secrets are never stored in the file itself. Bearer tokens are referenced
//! by `_env` fields naming environment variables and resolved at runtime via
//! [`AppConfig::resolve_env_vars`]; the Google source normally authenticates
//! with a service-account key file instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon / scheduling settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Source directory (Google Workspace) settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Target identity store (SCIM) settings.
    pub target: TargetConfig,

    /// Reconciliation behaviour.
    #[serde(default)]
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Daemon / scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between runs (default 900).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file; rotated daily when set.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    900
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Google Workspace Admin Directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory API base URL.
    #[serde(default = "default_source_api_url")]
    pub api_url: String,

    /// Customer id, or `my_customer` for the token's own account.
    #[serde(default = "default_customer")]
    pub customer: String,

    /// Service-account JSON key with domain-wide delegation.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,

    /// Workspace admin the service account impersonates.
    #[serde(default)]
    pub admin_email: Option<String>,

    /// Environment variable holding a pre-minted OAuth access token. Only
    /// used when `credentials_file` is unset.
    #[serde(default = "default_source_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_source_api_url() -> String {
    "https://admin.googleapis.com/admin/directory/v1".into()
}
fn default_customer() -> String {
    "my_customer".into()
}
fn default_source_token_env() -> String {
    "DIRSYNC_SOURCE_TOKEN".into()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_source_api_url(),
            customer: default_customer(),
            credentials_file: None,
            admin_email: None,
            token_env: default_source_token_env(),
            timeout_secs: default_timeout(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// SCIM 2.0 identity store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// SCIM base URL (e.g. `https://scim.example.com/scim/v2`).
    pub scim_endpoint: String,

    /// Environment variable holding the SCIM bearer token.
    #[serde(default = "default_target_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_target_token_env() -> String {
    "DIRSYNC_TARGET_TOKEN".into()
}
fn default_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Reconciliation behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Source-native filter for users, passed through untouched.
    #[serde(default)]
    pub user_match: String,

    /// Source-native filter for groups, passed through untouched.
    #[serde(default)]
    pub group_match: String,

    /// Usernames that are never created or deleted.
    #[serde(default)]
    pub ignore_users: Vec<String>,

    /// Group names (or group emails) that are never created.
    #[serde(default)]
    pub ignore_groups: Vec<String>,

    /// Accepted for compatibility; reconciliation does not read it.
    #[serde(default)]
    pub include_groups: Vec<String>,

    /// Page size for every listing call.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Groups whose memberships are reconciled concurrently.
    #[serde(default = "default_membership_concurrency")]
    pub membership_concurrency: usize,

    /// Also keep ignored groups out of the deletion set.
    #[serde(default)]
    pub protect_ignored_groups: bool,
}

fn default_page_size() -> u32 {
    50
}
fn default_membership_concurrency() -> usize {
    4
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            user_match: String::new(),
            group_match: String::new(),
            ignore_users: Vec::new(),
            ignore_groups: Vec::new(),
            include_groups: Vec::new(),
            page_size: default_page_size(),
            membership_concurrency: default_membership_concurrency(),
            protect_ignored_groups: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// Missing variables log a warning but do not fail; use
    /// [`require_tokens`](Self::require_tokens) before talking to either
    /// directory.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if self.source.credentials_file.is_none() {
            self.source.token = resolve_optional_env(&self.source.token_env, "source.token_env");
        }
        self.target.token = resolve_optional_env(&self.target.token_env, "target.token_env");

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Fail unless both directories have credentials.
    pub fn require_tokens(&self) -> Result<(), ConfigError> {
        if self.source.credentials_file.is_none() && self.source.token.is_none() {
            return Err(ConfigError::EnvVarMissing {
                var: self.source.token_env.clone(),
                field: "source.token_env".into(),
            });
        }
        if self.target.token.is_none() {
            return Err(ConfigError::EnvVarMissing {
                var: self.target.token_env.clone(),
                field: "target.token_env".into(),
            });
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.scim_endpoint.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "target.scim_endpoint".into(),
                detail: "SCIM endpoint must not be empty".into(),
            });
        }
        if self.source.api_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "source.api_url".into(),
                detail: "source API URL must not be empty".into(),
            });
        }
        if self.source.credentials_file.is_some()
            && self.source.admin_email.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "source.admin_email".into(),
                detail: "an admin to impersonate is required with credentials_file".into(),
            });
        }
        if self.daemon.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "daemon.poll_interval_secs".into(),
                detail: "poll interval must be > 0".into(),
            });
        }
        if self.sync.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.page_size".into(),
                detail: "page size must be > 0".into(),
            });
        }
        if self.sync.membership_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.membership_concurrency".into(),
                detail: "membership concurrency must be > 0".into(),
            });
        }
        if !self.sync.include_groups.is_empty() {
            warn!(
                count = self.sync.include_groups.len(),
                "sync.include_groups is set but is not applied during reconciliation"
            );
        }

        Ok(())
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
