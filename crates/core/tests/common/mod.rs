//! In-memory directory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use dirsync_core::directory::{SourceDirectory, TargetDirectory};
use dirsync_core::errors::DirectoryError;
use dirsync_core::models::{
    DirectoryGroup, DirectoryUser, GroupMembership, MemberId, SourceGroup, SourceMember,
    SourceUser,
};

fn injected(what: &str) -> DirectoryError {
    DirectoryError::ApiError {
        status: 500,
        body: format!("injected failure: {}", what),
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SourceState {
    pub users: Vec<SourceUser>,
    pub deleted: Vec<SourceUser>,
    pub groups: Vec<SourceGroup>,
    /// Group name -> member emails.
    pub members: HashMap<String, Vec<String>>,
    pub fail_list_users: bool,
    pub fail_list_members: bool,
    /// Queries passed to `list_users` / `list_groups`, in call order.
    pub user_queries: Vec<String>,
    pub group_queries: Vec<String>,
    pub member_listings: usize,
}

#[derive(Default)]
pub struct FakeSource {
    pub state: Mutex<SourceState>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, email: &str, given: &str, family: &str) {
        let mut state = self.state.lock().unwrap();
        let id = format!("src-{}", state.users.len() + 1);
        state.users.push(SourceUser {
            id,
            primary_email: email.into(),
            given_name: given.into(),
            family_name: family.into(),
            suspended: false,
        });
    }

    pub fn suspended_user(&self, email: &str) {
        let mut state = self.state.lock().unwrap();
        state.users.push(SourceUser {
            id: format!("src-s-{}", email),
            primary_email: email.into(),
            given_name: "Sus".into(),
            family_name: "Pended".into(),
            suspended: true,
        });
    }

    pub fn deleted_user(&self, email: &str) {
        self.state.lock().unwrap().deleted.push(SourceUser {
            id: format!("src-d-{}", email),
            primary_email: email.into(),
            given_name: String::new(),
            family_name: String::new(),
            suspended: false,
        });
    }

    pub fn group(&self, name: &str, members: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.groups.push(SourceGroup {
            id: format!("src-g-{}", name),
            name: name.into(),
            email: format!("{}@groups.x.com", name.to_lowercase()),
            description: format!("{} group", name),
        });
        state.members.insert(
            name.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }
}

#[async_trait]
impl SourceDirectory for FakeSource {
    fn issuer(&self) -> &str {
        "Google"
    }

    async fn list_users(&self, query: &str) -> Result<Vec<SourceUser>, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.user_queries.push(query.to_string());
        if state.fail_list_users {
            return Err(injected("list_users"));
        }
        Ok(state.users.clone())
    }

    async fn list_deleted_users(&self) -> Result<Vec<SourceUser>, DirectoryError> {
        Ok(self.state.lock().unwrap().deleted.clone())
    }

    async fn list_groups(&self, query: &str) -> Result<Vec<SourceGroup>, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.group_queries.push(query.to_string());
        Ok(state.groups.clone())
    }

    async fn list_group_members(
        &self,
        group: &SourceGroup,
    ) -> Result<Vec<SourceMember>, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.member_listings += 1;
        if state.fail_list_members {
            return Err(injected("list_group_members"));
        }
        Ok(state
            .members
            .get(&group.name)
            .map(|emails| {
                emails
                    .iter()
                    .map(|email| SourceMember {
                        email: email.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TargetState {
    pub users: Vec<DirectoryUser>,
    pub groups: Vec<DirectoryGroup>,
    pub memberships: Vec<GroupMembership>,
    next_id: u64,
    /// Every mutation, in the order it was applied.
    pub ops: Vec<String>,
    pub fail_create_user: HashSet<String>,
    pub fail_delete_user: HashSet<String>,
    pub fail_create_group: HashSet<String>,
    pub fail_delete_group: HashSet<String>,
    pub fail_add_member: HashSet<String>,
    pub fail_list_groups: bool,
}

impl TargetState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn group_name(&self, group_id: &str) -> String {
        self.groups
            .iter()
            .find(|g| g.id == group_id)
            .map(|g| g.display_name.clone())
            .unwrap_or_else(|| group_id.to_string())
    }

    fn member_name(&self, member: &MemberId) -> String {
        match member {
            MemberId::User(id) => self
                .users
                .iter()
                .find(|u| u.id.as_deref() == Some(id.as_str()))
                .map(|u| u.username.clone())
                .unwrap_or_else(|| id.clone()),
            MemberId::Group(id) => format!("group:{}", id),
        }
    }
}

#[derive(Default)]
pub struct FakeTarget {
    pub state: Mutex<TargetState>,
    gate: Option<Arc<Notify>>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// `list_users` waits on `gate` before answering.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            state: Mutex::default(),
            gate: Some(gate),
        }
    }

    pub fn user(&self, username: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("u");
        state.users.push(DirectoryUser {
            id: Some(id.clone()),
            username: username.into(),
            display_name: username.into(),
            given_name: String::new(),
            family_name: String::new(),
            emails: Vec::new(),
            external_id: None,
        });
        id
    }

    pub fn group(&self, name: &str, members: &[&str]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("g");
        state.groups.push(DirectoryGroup {
            id: id.clone(),
            display_name: name.into(),
            description: None,
        });
        for username in members {
            let user_id = state
                .users
                .iter()
                .find(|u| u.username == *username)
                .and_then(|u| u.id.clone())
                .unwrap_or_else(|| format!("unknown-{}", username));
            state.memberships.push(GroupMembership {
                id: format!("{}/{}", id, user_id),
                group_id: id.clone(),
                member: MemberId::User(user_id),
            });
        }
        id
    }

    /// Attach a raw member reference to an existing group.
    pub fn raw_member(&self, group_id: &str, member: MemberId) {
        let mut state = self.state.lock().unwrap();
        state.memberships.push(GroupMembership {
            id: format!("{}/{}", group_id, member.value()),
            group_id: group_id.into(),
            member,
        });
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }

    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .map(|u| u.username.clone())
            .collect();
        names.sort();
        names
    }

    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .groups
            .iter()
            .map(|g| g.display_name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn members_of(&self, group: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let Some(g) = state.groups.iter().find(|g| g.display_name == group) else {
            return Vec::new();
        };
        let mut names: Vec<String> = state
            .memberships
            .iter()
            .filter(|m| m.group_id == g.id)
            .map(|m| state.member_name(&m.member))
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl TargetDirectory for FakeTarget {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.state.lock().unwrap().users.clone())
    }

    async fn list_groups(&self) -> Result<Vec<DirectoryGroup>, DirectoryError> {
        let state = self.state.lock().unwrap();
        if state.fail_list_groups {
            return Err(injected("list_groups"));
        }
        Ok(state.groups.clone())
    }

    async fn list_group_members(
        &self,
        group: &DirectoryGroup,
    ) -> Result<Vec<GroupMembership>, DirectoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.group_id == group.id)
            .cloned()
            .collect())
    }

    async fn create_user(&self, user: &DirectoryUser) -> Result<DirectoryUser, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_user.contains(&user.username) {
            return Err(injected("create_user"));
        }
        let id = state.next_id("u");
        let created = DirectoryUser {
            id: Some(id),
            ..user.clone()
        };
        state.users.push(created.clone());
        state.ops.push(format!("create_user {}", user.username));
        Ok(created)
    }

    async fn delete_user(&self, user: &DirectoryUser) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete_user.contains(&user.username) {
            return Err(injected("delete_user"));
        }
        state.users.retain(|u| u.username != user.username);
        if let Some(id) = &user.id {
            state
                .memberships
                .retain(|m| m.member != MemberId::User(id.clone()));
        }
        state.ops.push(format!("delete_user {}", user.username));
        Ok(())
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<DirectoryGroup, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_group.contains(name) {
            return Err(injected("create_group"));
        }
        let id = state.next_id("g");
        let group = DirectoryGroup {
            id,
            display_name: name.into(),
            description: Some(description.into()),
        };
        state.groups.push(group.clone());
        state.ops.push(format!("create_group {}", name));
        Ok(group)
    }

    async fn delete_group(&self, group: &DirectoryGroup) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete_group.contains(&group.display_name) {
            return Err(injected("delete_group"));
        }
        state.groups.retain(|g| g.id != group.id);
        state.memberships.retain(|m| m.group_id != group.id);
        state.ops.push(format!("delete_group {}", group.display_name));
        Ok(())
    }

    async fn add_membership(
        &self,
        user: &DirectoryUser,
        group: &DirectoryGroup,
    ) -> Result<GroupMembership, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add_member.contains(&user.username) {
            return Err(injected("add_membership"));
        }
        let user_id = user.id.clone().unwrap_or_default();
        let membership = GroupMembership {
            id: format!("{}/{}", group.id, user_id),
            group_id: group.id.clone(),
            member: MemberId::User(user_id),
        };
        state.memberships.push(membership.clone());
        state
            .ops
            .push(format!("add_member {} {}", group.display_name, user.username));
        Ok(membership)
    }

    async fn remove_membership(
        &self,
        membership: &GroupMembership,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        let op = format!(
            "remove_member {} {}",
            state.group_name(&membership.group_id),
            state.member_name(&membership.member)
        );
        state.memberships.retain(|m| m.id != membership.id);
        state.ops.push(op);
        Ok(())
    }
}
