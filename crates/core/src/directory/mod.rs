//! Source and target directory adapters.
//!
//! The reconciler only talks to the two traits defined here. Every listing
//! call drains all pages before returning, so callers never observe a
//! partial listing: a failed page fails the whole call.

pub mod google;
pub mod google_auth;
pub mod scim;

use async_trait::async_trait;

use crate::errors::DirectoryError;
use crate::models::{
    DirectoryGroup, DirectoryUser, GroupMembership, SourceGroup, SourceMember, SourceUser,
};

pub use google::GoogleDirectory;
pub use google_auth::{GoogleAuth, ServiceAccountAuth};
pub use scim::ScimTarget;

/// Read-only access to the source of truth.
#[async_trait]
pub trait SourceDirectory: Send + Sync {
    /// Name of the source system, recorded as the issuer of external ids.
    fn issuer(&self) -> &str;

    /// Active users matching a source-native filter (empty = all).
    async fn list_users(&self, query: &str) -> Result<Vec<SourceUser>, DirectoryError>;

    /// Recently deleted users.
    async fn list_deleted_users(&self) -> Result<Vec<SourceUser>, DirectoryError>;

    /// Groups matching a source-native filter (empty = all).
    async fn list_groups(&self, query: &str) -> Result<Vec<SourceGroup>, DirectoryError>;

    /// Direct members of a group.
    async fn list_group_members(
        &self,
        group: &SourceGroup,
    ) -> Result<Vec<SourceMember>, DirectoryError>;
}

/// Read/write access to the identity store being converged.
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError>;

    async fn list_groups(&self) -> Result<Vec<DirectoryGroup>, DirectoryError>;

    async fn list_group_members(
        &self,
        group: &DirectoryGroup,
    ) -> Result<Vec<GroupMembership>, DirectoryError>;

    /// Create a user and return it carrying its target-assigned id.
    async fn create_user(&self, user: &DirectoryUser) -> Result<DirectoryUser, DirectoryError>;

    async fn delete_user(&self, user: &DirectoryUser) -> Result<(), DirectoryError>;

    async fn create_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<DirectoryGroup, DirectoryError>;

    async fn delete_group(&self, group: &DirectoryGroup) -> Result<(), DirectoryError>;

    async fn add_membership(
        &self,
        user: &DirectoryUser,
        group: &DirectoryGroup,
    ) -> Result<GroupMembership, DirectoryError>;

    async fn remove_membership(&self, membership: &GroupMembership)
        -> Result<(), DirectoryError>;
}

/// Map a non-success HTTP response to a [`DirectoryError`].
pub(crate) async fn check_response(
    resp: reqwest::Response,
) -> Result<reqwest::Response, DirectoryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(DirectoryError::AuthenticationFailed(format!(
            "HTTP {}",
            status
        )));
    }
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(DirectoryError::RateLimited { retry_after });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DirectoryError::ApiError {
        status: status.as_u16(),
        body,
    })
}
