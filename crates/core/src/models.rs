//! Domain model types used throughout dirsync.
//!
//! Target-side types (`DirectoryUser`, `DirectoryGroup`, `GroupMembership`)
//! mirror what the identity store holds. Source-side types are the read-only
//! projections the source directory adapter hands to the reconciler.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Target entities
// ---------------------------------------------------------------------------

/// A user in the target identity store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryUser {
    /// Target-assigned id; `None` until the user has been created.
    pub id: Option<String>,
    /// Natural key, usually the primary email. Matched exactly.
    pub username: String,
    pub display_name: String,
    pub given_name: String,
    pub family_name: String,
    pub emails: Vec<Email>,
    /// Where the user came from. Informational only.
    pub external_id: Option<ExternalId>,
}

/// An email address attached to a [`DirectoryUser`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub value: String,
    /// Email type, e.g. `work`.
    pub kind: String,
    pub primary: bool,
}

/// Source system and source-native id of a provisioned user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalId {
    pub issuer: String,
    pub id: String,
}

impl DirectoryUser {
    /// The primary email, if any.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .find(|e| e.primary)
            .map(|e| e.value.as_str())
    }
}

/// A group in the target identity store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryGroup {
    pub id: String,
    /// Natural key.
    pub display_name: String,
    pub description: Option<String>,
}

/// What a target membership points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MemberId {
    User(String),
    Group(String),
}

impl MemberId {
    /// Human-readable name of the identifier kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
        }
    }

    /// The raw identifier regardless of kind.
    pub fn value(&self) -> &str {
        match self {
            Self::User(v) | Self::Group(v) => v,
        }
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

/// A (group, member) pair in the target identity store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMembership {
    pub id: String,
    pub group_id: String,
    pub member: MemberId,
}

// ---------------------------------------------------------------------------
// Source entities
// ---------------------------------------------------------------------------

/// A user as reported by the source directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceUser {
    /// Source-native id.
    pub id: String,
    pub primary_email: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(default)]
    pub suspended: bool,
}

/// A group as reported by the source directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceGroup {
    /// Source-native id.
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub description: String,
}

/// A group member as reported by the source directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceMember {
    pub email: String,
}
