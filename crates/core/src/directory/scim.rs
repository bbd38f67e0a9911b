//! SCIM 2.0 (RFC 7644) target adapter.
//!
//! SCIM has no membership resource of its own: memberships live in the
//! `members` attribute of a group and are changed with `PATCH`. A membership
//! id is therefore synthesized as `{groupId}/{memberId}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{check_response, TargetDirectory};
use crate::errors::DirectoryError;
use crate::models::{DirectoryGroup, DirectoryUser, Email, GroupMembership, MemberId};

const SCIM_MEDIA_TYPE: &str = "application/scim+json";
const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
const PATCH_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimUser {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
    user_name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    name: ScimName,
    #[serde(default)]
    emails: Vec<ScimEmail>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimName {
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScimEmail {
    value: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    members: Vec<ScimMember>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScimMember {
    value: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimListResponse<T> {
    #[serde(default)]
    total_results: usize,
    #[serde(rename = "Resources", default = "Vec::new")]
    resources: Vec<T>,
}

#[derive(Debug, Serialize)]
struct ScimPatchRequest {
    schemas: Vec<String>,
    #[serde(rename = "Operations")]
    operations: Vec<ScimPatchOp>,
}

#[derive(Debug, Serialize)]
struct ScimPatchOp {
    op: &'static str,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
}

impl From<&DirectoryUser> for ScimUser {
    fn from(u: &DirectoryUser) -> Self {
        Self {
            schemas: vec![USER_SCHEMA.to_string()],
            id: None,
            external_id: u.external_id.as_ref().map(|e| e.id.clone()),
            user_name: u.username.clone(),
            display_name: u.display_name.clone(),
            name: ScimName {
                given_name: u.given_name.clone(),
                family_name: u.family_name.clone(),
            },
            emails: u
                .emails
                .iter()
                .map(|e| ScimEmail {
                    value: e.value.clone(),
                    kind: e.kind.clone(),
                    primary: e.primary,
                })
                .collect(),
            active: true,
        }
    }
}

impl From<ScimUser> for DirectoryUser {
    fn from(u: ScimUser) -> Self {
        Self {
            id: u.id,
            username: u.user_name,
            display_name: u.display_name,
            given_name: u.name.given_name,
            family_name: u.name.family_name,
            emails: u
                .emails
                .into_iter()
                .map(|e| Email {
                    value: e.value,
                    kind: e.kind,
                    primary: e.primary,
                })
                .collect(),
            // SCIM keeps a bare externalId string; the issuer is not stored.
            external_id: None,
        }
    }
}

fn member_id(member: &ScimMember) -> MemberId {
    match member.kind.as_deref() {
        Some(kind) if kind.eq_ignore_ascii_case("group") => MemberId::Group(member.value.clone()),
        _ => MemberId::User(member.value.clone()),
    }
}

fn membership_id(group_id: &str, member_id: &str) -> String {
    format!("{}/{}", group_id, member_id)
}

/// PATCH path selecting one member. The id is a JSON string literal inside
/// the filter, so quotes and backslashes are escaped.
fn member_filter(member_id: &str) -> String {
    let escaped = member_id.replace('\\', "\\\\").replace('"', "\\\"");
    format!("members[value eq \"{}\"]", escaped)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// SCIM 2.0 identity store client.
#[derive(Clone)]
pub struct ScimTarget {
    http: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl ScimTarget {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dirsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!(base_url = %base_url, "created ScimTarget");
        Ok(Self {
            http,
            base_url,
            token: token.into(),
            page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, HeaderValue::from_static(SCIM_MEDIA_TYPE))
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, DirectoryError> {
        let resp = self
            .request(method, path)
            .header(CONTENT_TYPE, HeaderValue::from_static(SCIM_MEDIA_TYPE))
            .json(body)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| DirectoryError::Parse(e.to_string()))
    }

    async fn send_empty(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&ScimPatchRequest>,
    ) -> Result<(), DirectoryError> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req
                .header(CONTENT_TYPE, HeaderValue::from_static(SCIM_MEDIA_TYPE))
                .json(body);
        }
        check_response(req.send().await?).await?;
        Ok(())
    }

    /// Page through a SCIM list endpoint until `totalResults` is reached.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, DirectoryError> {
        let mut items: Vec<T> = Vec::new();
        let mut start_index = 1usize;

        loop {
            let resp = self
                .request(reqwest::Method::GET, path)
                .query(params)
                .query(&[
                    ("startIndex", start_index.to_string()),
                    ("count", self.page_size.to_string()),
                ])
                .send()
                .await?;
            let resp = check_response(resp).await?;
            let page: ScimListResponse<T> = resp
                .json()
                .await
                .map_err(|e| DirectoryError::Parse(e.to_string()))?;

            let fetched = page.resources.len();
            items.extend(page.resources);
            if fetched == 0 || items.len() >= page.total_results {
                break;
            }
            start_index += fetched;
        }

        debug!(path, count = items.len(), "drained listing");
        Ok(items)
    }

    fn patch(op: &'static str, path: String, value: Option<serde_json::Value>) -> ScimPatchRequest {
        ScimPatchRequest {
            schemas: vec![PATCH_SCHEMA.to_string()],
            operations: vec![ScimPatchOp { op, path, value }],
        }
    }
}

#[async_trait]
impl TargetDirectory for ScimTarget {
    #[instrument(skip(self))]
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let users: Vec<ScimUser> = self.fetch_all("/Users", &[]).await?;
        Ok(users.into_iter().map(DirectoryUser::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_groups(&self) -> Result<Vec<DirectoryGroup>, DirectoryError> {
        let groups: Vec<ScimGroup> = self
            .fetch_all("/Groups", &[("excludedAttributes", "members")])
            .await?;
        groups
            .into_iter()
            .map(|g| {
                let id = g.id.ok_or_else(|| DirectoryError::MissingId {
                    entity: "group",
                    name: g.display_name.clone(),
                })?;
                Ok(DirectoryGroup {
                    id,
                    display_name: g.display_name,
                    description: g.description,
                })
            })
            .collect()
    }

    #[instrument(skip(self, group), fields(group = %group.display_name))]
    async fn list_group_members(
        &self,
        group: &DirectoryGroup,
    ) -> Result<Vec<GroupMembership>, DirectoryError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/Groups/{}", group.id))
            .query(&[("attributes", "members")])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let scim_group: ScimGroup = resp
            .json()
            .await
            .map_err(|e| DirectoryError::Parse(e.to_string()))?;

        Ok(scim_group
            .members
            .iter()
            .map(|m| GroupMembership {
                id: membership_id(&group.id, &m.value),
                group_id: group.id.clone(),
                member: member_id(m),
            })
            .collect())
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: &DirectoryUser) -> Result<DirectoryUser, DirectoryError> {
        let created: ScimUser = self
            .send_json(reqwest::Method::POST, "/Users", &ScimUser::from(user))
            .await?;
        let id = created.id.ok_or_else(|| DirectoryError::MissingId {
            entity: "user",
            name: user.username.clone(),
        })?;
        info!(username = %user.username, id = %id, "created user");
        Ok(DirectoryUser {
            id: Some(id),
            ..user.clone()
        })
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn delete_user(&self, user: &DirectoryUser) -> Result<(), DirectoryError> {
        let id = user.id.as_deref().ok_or_else(|| DirectoryError::MissingId {
            entity: "user",
            name: user.username.clone(),
        })?;
        self.send_empty(reqwest::Method::DELETE, &format!("/Users/{}", id), None)
            .await
    }

    #[instrument(skip(self, description))]
    async fn create_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<DirectoryGroup, DirectoryError> {
        let body = ScimGroup {
            schemas: vec![GROUP_SCHEMA.to_string()],
            id: None,
            display_name: name.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            members: Vec::new(),
        };
        let created: ScimGroup = self
            .send_json(reqwest::Method::POST, "/Groups", &body)
            .await?;
        let id = created.id.ok_or_else(|| DirectoryError::MissingId {
            entity: "group",
            name: name.to_string(),
        })?;
        info!(group = name, id = %id, "created group");
        Ok(DirectoryGroup {
            id,
            display_name: name.to_string(),
            description: body.description,
        })
    }

    #[instrument(skip(self, group), fields(group = %group.display_name))]
    async fn delete_group(&self, group: &DirectoryGroup) -> Result<(), DirectoryError> {
        self.send_empty(
            reqwest::Method::DELETE,
            &format!("/Groups/{}", group.id),
            None,
        )
        .await
    }

    #[instrument(skip(self, user, group), fields(username = %user.username, group = %group.display_name))]
    async fn add_membership(
        &self,
        user: &DirectoryUser,
        group: &DirectoryGroup,
    ) -> Result<GroupMembership, DirectoryError> {
        let user_id = user.id.as_deref().ok_or_else(|| DirectoryError::MissingId {
            entity: "user",
            name: user.username.clone(),
        })?;
        let patch = Self::patch(
            "add",
            "members".to_string(),
            Some(serde_json::json!([{ "value": user_id }])),
        );
        self.send_empty(
            reqwest::Method::PATCH,
            &format!("/Groups/{}", group.id),
            Some(&patch),
        )
        .await?;
        Ok(GroupMembership {
            id: membership_id(&group.id, user_id),
            group_id: group.id.clone(),
            member: MemberId::User(user_id.to_string()),
        })
    }

    #[instrument(skip(self, membership), fields(membership = %membership.id))]
    async fn remove_membership(
        &self,
        membership: &GroupMembership,
    ) -> Result<(), DirectoryError> {
        let patch = Self::patch(
            "remove",
            member_filter(membership.member.value()),
            None,
        );
        self.send_empty(
            reqwest::Method::PATCH,
            &format!("/Groups/{}", membership.group_id),
            Some(&patch),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExternalId;

    #[test]
    fn test_member_filter_escapes_value() {
        assert_eq!(member_filter("u1"), r#"members[value eq "u1"]"#);
        assert_eq!(
            member_filter(r#"a"] or value pr or ["\"#),
            r#"members[value eq "a\"] or value pr or [\"\\"]"#
        );
    }

    #[test]
    fn test_user_serializes_as_scim() {
        let user = DirectoryUser {
            id: None,
            username: "jdoe@example.com".into(),
            display_name: "John Doe".into(),
            given_name: "John".into(),
            family_name: "Doe".into(),
            emails: vec![Email {
                value: "jdoe@example.com".into(),
                kind: "work".into(),
                primary: true,
            }],
            external_id: Some(ExternalId {
                issuer: "Google".into(),
                id: "1001".into(),
            }),
        };
        let json = serde_json::to_value(ScimUser::from(&user)).unwrap();
        assert_eq!(json["userName"], "jdoe@example.com");
        assert_eq!(json["name"]["givenName"], "John");
        assert_eq!(json["emails"][0]["type"], "work");
        assert_eq!(json["externalId"], "1001");
        assert_eq!(json["schemas"][0], USER_SCHEMA);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_member_kind_mapping() {
        let user = ScimMember {
            value: "u1".into(),
            kind: None,
        };
        let group = ScimMember {
            value: "g1".into(),
            kind: Some("Group".into()),
        };
        assert_eq!(member_id(&user), MemberId::User("u1".into()));
        assert_eq!(member_id(&group), MemberId::Group("g1".into()));
        assert_eq!(membership_id("g9", "u1"), "g9/u1");
    }

    #[test]
    fn test_remove_patch_shape() {
        let patch = ScimTarget::patch("remove", "members[value eq \"u1\"]".into(), None);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["schemas"][0], PATCH_SCHEMA);
        assert_eq!(json["Operations"][0]["op"], "remove");
        assert!(json["Operations"][0].get("value").is_none());
    }
}
