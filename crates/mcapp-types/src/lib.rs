//! Resource model for the multi-cluster application controller
//!
//! A MultiClusterApp (MCApp) describes one logical application that must be
//! deployed into many projects spread across independently managed clusters.
//! The controller converges a per-project [`App`] for every target, snapshots
//! each completed rollout into an immutable [`MultiClusterAppRevision`], and
//! maintains owner/member/read-only access objects for collaborators.
//!
//! ## Key Concepts
//!
//! - **MultiClusterApp**: desired state root (template, answers, targets)
//! - **App**: the per-project object a deployment engine acts on
//! - **Revision**: snapshot of template + answers after a full rollout
//! - **Conditions**: tri-state Installed/Deployed flags
//! - **Access objects**: Role + RoleBinding per access tier

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod access;
pub mod app;
pub mod condition;
pub mod error;
pub mod mcapp;
pub mod meta;
pub mod project;

pub use access::{
    AccessTier, Member, PolicyRule, Role, RoleBinding, RoleRef, Subject, SubjectKind,
    ACCESS_RESOURCE_NAME_LABEL, ACCESS_RESOURCE_TYPE_LABEL, ACCESS_TIER_LABEL,
};
pub use app::{App, AppSpec, AppStatus, TemplateVersion};
pub use condition::{ConditionStatus, ConditionType, Conditions, UPGRADING};
pub use error::{Result, TypeError};
pub use mcapp::{
    Answer, AppState, MultiClusterApp, MultiClusterAppRevision, MultiClusterAppSpec,
    MultiClusterAppStatus, RollingUpdate, Target, UpgradeStrategy, API_GROUP, API_VERSION,
    CREATOR_ID_ANNOTATION, GLOBAL_NAMESPACE, MCAPP_ID_LABEL, REVISION_GENERATE_NAME,
    REVISION_MCAPP_LABEL,
};
pub use meta::{ObjectKey, ObjectMeta, OwnerReference, Resource};
pub use project::{split_project_name, ProjectRef};
