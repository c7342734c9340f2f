//! Access tiers, roles and role bindings

use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label carrying the kind of resource an access object grants on
pub const ACCESS_RESOURCE_TYPE_LABEL: &str = "mcapp.cattle.io/resource-type";

/// Label carrying the name of the resource an access object grants on
pub const ACCESS_RESOURCE_NAME_LABEL: &str = "mcapp.cattle.io/resource-name";

/// Label carrying the access tier of an access object
pub const ACCESS_TIER_LABEL: &str = "mcapp.cattle.io/access-tier";

/// Level of access granted to a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessTier {
    #[serde(rename = "owner")]
    Owner,
    #[serde(rename = "member")]
    Member,
    #[serde(rename = "read-only")]
    ReadOnly,
}

impl AccessTier {
    pub const ALL: [AccessTier; 3] = [AccessTier::Owner, AccessTier::Member, AccessTier::ReadOnly];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Owner => "owner",
            AccessTier::Member => "member",
            AccessTier::ReadOnly => "read-only",
        }
    }

    /// Verbs granted on the owned resource
    pub fn verbs(&self) -> &'static [&'static str] {
        match self {
            AccessTier::Owner => &["*"],
            AccessTier::Member => &["get", "list", "watch", "update", "patch"],
            AccessTier::ReadOnly => &["get", "list", "watch"],
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collaborator listed on an MCApp
///
/// Exactly one of `user_name` or `group_name` is expected; a member with
/// neither is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,

    pub access_type: AccessTier,
}

impl Member {
    pub fn user(name: impl Into<String>, access_type: AccessTier) -> Self {
        Self {
            user_name: Some(name.into()),
            group_name: None,
            access_type,
        }
    }

    pub fn group(name: impl Into<String>, access_type: AccessTier) -> Self {
        Self {
            user_name: None,
            group_name: Some(name.into()),
            access_type,
        }
    }

    pub fn subject(&self) -> Option<Subject> {
        match (&self.user_name, &self.group_name) {
            (Some(user), _) if !user.is_empty() => Some(Subject::user(user.clone())),
            (_, Some(group)) if !group.is_empty() => Some(Subject::group(group.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
}

/// Identity a role binding grants to; ordered by name first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
}

impl Subject {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            name: name.into(),
        }
    }
}

impl Ord for Subject {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for Subject {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub resource_names: Vec<String>,
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

crate::impl_resource!(Role, "Role", "roles");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub metadata: ObjectMeta,
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

crate::impl_resource!(RoleBinding, "RoleBinding", "rolebindings");
