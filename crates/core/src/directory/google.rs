//! Google Workspace Admin Directory API source adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::google_auth::GoogleAuth;
use super::{check_response, SourceDirectory};
use crate::errors::DirectoryError;
use crate::models::{SourceGroup, SourceMember, SourceUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUser {
    id: String,
    primary_email: String,
    #[serde(default)]
    name: GoogleName,
    #[serde(default)]
    suspended: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleName {
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
}

#[derive(Debug, Deserialize)]
struct GoogleGroup {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct GoogleMember {
    #[serde(default)]
    email: Option<String>,
}

impl From<GoogleUser> for SourceUser {
    fn from(u: GoogleUser) -> Self {
        Self {
            id: u.id,
            primary_email: u.primary_email,
            given_name: u.name.given_name,
            family_name: u.name.family_name,
            suspended: u.suspended,
        }
    }
}

impl From<GoogleGroup> for SourceGroup {
    fn from(g: GoogleGroup) -> Self {
        Self {
            id: g.id,
            name: g.name,
            email: g.email,
            description: g.description,
        }
    }
}

/// Asynchronous Admin Directory API client.
#[derive(Clone)]
pub struct GoogleDirectory {
    http: reqwest::Client,
    base: Url,
    customer: String,
    auth: Arc<GoogleAuth>,
    page_size: u32,
}

impl GoogleDirectory {
    pub fn new(
        api_url: &str,
        customer: impl Into<String>,
        auth: GoogleAuth,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let base = Url::parse(api_url)
            .map_err(|e| DirectoryError::InvalidUrl(format!("{}: {}", api_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(api_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("dirsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        info!(api_url = %base, timeout_secs = timeout.as_secs(), "created GoogleDirectory");
        Ok(Self {
            http,
            base,
            customer: customer.into(),
            auth: Arc::new(auth),
            page_size,
        })
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, DirectoryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET the endpoint repeatedly, following `nextPageToken`, and collect
    /// the array stored under `field` from every page.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
        field: &str,
    ) -> Result<Vec<T>, DirectoryError> {
        let url = self.endpoint(segments)?;
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let bearer = self.auth.bearer(&self.http).await?;
            let mut req = self
                .http
                .get(url.clone())
                .bearer_auth(bearer)
                .query(params)
                .query(&[("maxResults", self.page_size.to_string())]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token)]);
            }

            let resp = check_response(req.send().await?).await?;
            let mut body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| DirectoryError::Parse(e.to_string()))?;
            pages += 1;

            // An empty page omits the field entirely.
            if let Some(list) = body.get_mut(field).map(serde_json::Value::take) {
                let page: Vec<T> = serde_json::from_value(list)
                    .map_err(|e| DirectoryError::Parse(format!("{}: {}", field, e)))?;
                items.extend(page);
            }

            match body.get("nextPageToken").and_then(|v| v.as_str()) {
                Some(next) if !next.is_empty() => page_token = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(path = url.path(), pages, count = items.len(), "drained listing");
        Ok(items)
    }

    fn customer_params(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![("customer", self.customer.clone())];
        if !query.is_empty() {
            params.push(("query", query.to_string()));
        }
        params
    }
}

#[async_trait]
impl SourceDirectory for GoogleDirectory {
    fn issuer(&self) -> &str {
        "Google"
    }

    #[instrument(skip(self))]
    async fn list_users(&self, query: &str) -> Result<Vec<SourceUser>, DirectoryError> {
        let users: Vec<GoogleUser> = self
            .fetch_all(&["users"], &self.customer_params(query), "users")
            .await?;
        Ok(users.into_iter().map(SourceUser::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_deleted_users(&self) -> Result<Vec<SourceUser>, DirectoryError> {
        let mut params = self.customer_params("");
        params.push(("showDeleted", "true".to_string()));
        let users: Vec<GoogleUser> = self.fetch_all(&["users"], &params, "users").await?;
        Ok(users.into_iter().map(SourceUser::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, query: &str) -> Result<Vec<SourceGroup>, DirectoryError> {
        let groups: Vec<GoogleGroup> = self
            .fetch_all(&["groups"], &self.customer_params(query), "groups")
            .await?;
        Ok(groups.into_iter().map(SourceGroup::from).collect())
    }

    #[instrument(skip(self, group), fields(group = %group.name))]
    async fn list_group_members(
        &self,
        group: &SourceGroup,
    ) -> Result<Vec<SourceMember>, DirectoryError> {
        let key = if group.email.is_empty() {
            &group.id
        } else {
            &group.email
        };
        let members: Vec<GoogleMember> = self
            .fetch_all(&["groups", key.as_str(), "members"], &[], "members")
            .await?;
        // Customer-wide members carry no email and cannot map to a user.
        Ok(members
            .into_iter()
            .filter_map(|m| m.email)
            .map(|email| SourceMember { email })
            .collect())
    }
}
