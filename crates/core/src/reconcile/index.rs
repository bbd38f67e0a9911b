//! Lookup structure over target users.
//!
//! Users are stored once, keyed by username; the target-id map points back
//! at the username so both lookups return the same entity.

use std::collections::HashMap;

use tracing::warn;

use crate::errors::IdentityError;
use crate::models::{DirectoryUser, GroupMembership, MemberId};

/// Target users indexed by username and by target-assigned id.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_username: HashMap<String, DirectoryUser>,
    by_target_id: HashMap<String, String>,
}

impl IdentityIndex {
    /// Build the index from a complete target listing.
    ///
    /// If the listing contains the same username twice the later entry wins.
    pub fn build(users: Vec<DirectoryUser>) -> Self {
        let mut index = Self::default();
        for user in users {
            if index.by_username.contains_key(&user.username) {
                warn!(username = %user.username, "duplicate username in target listing");
            }
            index.insert(user);
        }
        index
    }

    /// Add or replace a user. Only used while users are being reconciled.
    pub(crate) fn insert(&mut self, user: DirectoryUser) {
        if let Some(previous) = self.by_username.get(&user.username) {
            if let Some(ref old_id) = previous.id {
                self.by_target_id.remove(old_id);
            }
        }
        if let Some(ref id) = user.id {
            self.by_target_id.insert(id.clone(), user.username.clone());
        }
        self.by_username.insert(user.username.clone(), user);
    }

    pub fn by_username(&self, username: &str) -> Option<&DirectoryUser> {
        self.by_username.get(username)
    }

    pub fn by_target_id(&self, id: &str) -> Option<&DirectoryUser> {
        self.by_target_id
            .get(id)
            .and_then(|username| self.by_username.get(username))
    }

    /// Resolve the member of a target membership to a known user.
    pub fn resolve_member(
        &self,
        membership: &GroupMembership,
    ) -> Result<&DirectoryUser, IdentityError> {
        match &membership.member {
            MemberId::User(user_id) => {
                self.by_target_id(user_id)
                    .ok_or_else(|| IdentityError::UnknownMember {
                        membership_id: membership.id.clone(),
                        user_id: user_id.clone(),
                    })
            }
            other => Err(IdentityError::UnexpectedMemberKind {
                membership_id: membership.id.clone(),
                kind: other.kind(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, id: Option<&str>) -> DirectoryUser {
        DirectoryUser {
            id: id.map(String::from),
            username: username.into(),
            display_name: String::new(),
            given_name: String::new(),
            family_name: String::new(),
            emails: Vec::new(),
            external_id: None,
        }
    }

    fn membership(member: MemberId) -> GroupMembership {
        GroupMembership {
            id: "m-1".into(),
            group_id: "g-1".into(),
            member,
        }
    }

    #[test]
    fn test_build_indexes_both_keys() {
        let index = IdentityIndex::build(vec![
            user("a@x.com", Some("u-a")),
            user("b@x.com", Some("u-b")),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.by_username("a@x.com").unwrap().id.as_deref(), Some("u-a"));
        assert_eq!(index.by_target_id("u-b").unwrap().username, "b@x.com");
        assert!(index.by_username("A@x.com").is_none());
    }

    #[test]
    fn test_insert_replaces_stale_id() {
        let mut index = IdentityIndex::build(vec![user("a@x.com", Some("old"))]);
        index.insert(user("a@x.com", Some("new")));
        assert!(index.by_target_id("old").is_none());
        assert_eq!(index.by_target_id("new").unwrap().username, "a@x.com");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_user_without_id_is_not_id_indexed() {
        let index = IdentityIndex::build(vec![user("a@x.com", None)]);
        assert!(index.by_username("a@x.com").is_some());
        assert!(index.by_target_id("").is_none());
    }

    #[test]
    fn test_resolve_member() {
        let index = IdentityIndex::build(vec![user("a@x.com", Some("u-a"))]);

        let ok = membership(MemberId::User("u-a".into()));
        assert_eq!(index.resolve_member(&ok).unwrap().username, "a@x.com");

        let unknown = membership(MemberId::User("u-zz".into()));
        assert_eq!(
            index.resolve_member(&unknown),
            Err(IdentityError::UnknownMember {
                membership_id: "m-1".into(),
                user_id: "u-zz".into(),
            })
        );

        let nested = membership(MemberId::Group("g-2".into()));
        assert!(matches!(
            index.resolve_member(&nested),
            Err(IdentityError::UnexpectedMemberKind { kind: "group", .. })
        ));
    }
}
