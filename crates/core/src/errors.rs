//! Error types for the dirsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Adapter
//! failures are wrapped into [`SyncError`] with the listing or entity that
//! failed; the daemon adds context with `anyhow`.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Directory adapter errors
// ---------------------------------------------------------------------------

/// Errors raised by a source or target directory adapter.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("directory HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("directory API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Credentials were rejected.
    #[error("directory authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("directory rate limit exceeded, retry after {retry_after}")]
    RateLimited { retry_after: String },

    /// The response body could not be decoded.
    #[error("directory response parse error: {0}")]
    Parse(String),

    /// A service-account key could not be read or used to sign.
    #[error("directory credentials error: {0}")]
    Credentials(String),

    /// A configured base URL cannot be extended into a request URL.
    #[error("invalid directory URL '{0}'")]
    InvalidUrl(String),

    /// An entity that must carry a target-assigned id has none.
    #[error("{entity} '{name}' has no target-assigned id")]
    MissingId { entity: &'static str, name: String },
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Run-fatal errors from the reconciliation engine.
///
/// Recoverable per-entity failures (user or group creation, user deletion)
/// never surface here; they are logged and counted in the run statistics.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run is already in progress.
    #[error("sync already in progress (started at {started_at})")]
    AlreadyRunning { started_at: String },

    /// A source listing could not be drained.
    #[error("failed to fetch {what} from source directory: {source}")]
    SourceFetch {
        what: &'static str,
        #[source]
        source: DirectoryError,
    },

    /// A target listing could not be drained.
    #[error("failed to fetch {what} from target directory: {source}")]
    TargetFetch {
        what: &'static str,
        #[source]
        source: DirectoryError,
    },

    /// Deleting a group that vanished from the source failed.
    #[error("failed to delete group '{group}': {source}")]
    GroupDeletion {
        group: String,
        #[source]
        source: DirectoryError,
    },

    /// Removing a stale membership failed.
    #[error("failed to remove membership {membership_id} from group '{group}': {source}")]
    MembershipRemoval {
        group: String,
        membership_id: String,
        #[source]
        source: DirectoryError,
    },

    /// Adding a desired membership failed.
    #[error("failed to add '{username}' to group '{group}': {source}")]
    MembershipAddition {
        group: String,
        username: String,
        #[source]
        source: DirectoryError,
    },

    /// A membership worker task panicked or was cancelled.
    #[error("membership worker failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

/// Anomalies found while resolving a target membership to a known user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The membership references something other than a user.
    #[error("membership {membership_id} references a {kind}, not a user")]
    UnexpectedMemberKind {
        membership_id: String,
        kind: &'static str,
    },

    /// The referenced user id is not in the identity index.
    #[error("membership {membership_id} references unknown user id '{user_id}'")]
    UnknownMember {
        membership_id: String,
        user_id: String,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
