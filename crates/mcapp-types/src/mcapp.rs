//! MultiClusterApp and its revision snapshots

use crate::condition::Conditions;
use crate::meta::{ObjectMeta, OwnerReference, Resource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Annotation holding the identity of the user that created the object
pub const CREATOR_ID_ANNOTATION: &str = "field.cattle.io/creatorId";

/// Label placed on every App owned by an MCApp
pub const MCAPP_ID_LABEL: &str = "mcapp";

/// Label placed on every revision of an MCApp
pub const REVISION_MCAPP_LABEL: &str = "io.cattle.field/multiClusterAppId";

/// Namespace holding MCApps, revisions and their access objects
pub const GLOBAL_NAMESPACE: &str = "cattle-global-data";

/// Name prefix for generated revisions
pub const REVISION_GENERATE_NAME: &str = "mcapprevision-";

pub const API_GROUP: &str = "management.cattle.io";
pub const API_VERSION: &str = "management.cattle.io/v3";

/// One scoped answer set
///
/// With neither `project_name` nor `cluster_name` set the entry is the
/// global default. `project_name` takes the form `cluster:project`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    #[serde(default)]
    pub values: BTreeMap<String, String>,

    /// Values that must be passed to the chart as strings
    #[serde(default)]
    pub values_set_string: BTreeMap<String, String>,
}

impl Answer {
    pub fn global(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    pub fn for_cluster(cluster: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            cluster_name: Some(cluster.into()),
            values,
            ..Default::default()
        }
    }

    pub fn for_project(project: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            project_name: Some(project.into()),
            values,
            ..Default::default()
        }
    }
}

/// Derived state of a target or of the whole MCApp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Installing,
    Deploying,
    Active,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Installing => "installing",
            AppState::Deploying => "deploying",
            AppState::Active => "active",
        }
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project the MCApp must be deployed into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// `cluster:project`
    pub project_name: String,

    /// Name of the App created for this target; set once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AppState>,
}

impl Target {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingUpdate {
    pub batch_size: usize,

    /// Seconds between batches
    #[serde(default)]
    pub interval: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiClusterAppSpec {
    /// Template version reference in the form `namespace:name`
    pub template_version_name: String,

    #[serde(default)]
    pub answers: Vec<Answer>,

    #[serde(default)]
    pub targets: Vec<Target>,

    #[serde(default)]
    pub upgrade_strategy: UpgradeStrategy,

    #[serde(default)]
    pub members: Vec<crate::access::Member>,

    #[serde(default)]
    pub wait: bool,

    /// Per-App install timeout in seconds
    #[serde(default)]
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiClusterAppStatus {
    /// Revision last fully rolled out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_name: Option<String>,

    #[serde(default)]
    pub conditions: Conditions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AppState>,
}

/// Desired-state root for a multi-cluster deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiClusterApp {
    pub metadata: ObjectMeta,
    pub spec: MultiClusterAppSpec,
    #[serde(default)]
    pub status: MultiClusterAppStatus,
}

crate::impl_resource!(MultiClusterApp, "MultiClusterApp", "multiclusterapps");

impl MultiClusterApp {
    pub fn new(name: impl Into<String>, spec: MultiClusterAppSpec) -> Self {
        Self {
            metadata: ObjectMeta::named(GLOBAL_NAMESPACE, name),
            spec,
            status: MultiClusterAppStatus::default(),
        }
    }

    pub fn creator_id(&self) -> Option<&str> {
        self.metadata
            .annotation(CREATOR_ID_ANNOTATION)
            .filter(|creator| !creator.is_empty())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn rolling_update(&self) -> Option<RollingUpdate> {
        self.spec.upgrade_strategy.rolling_update
    }

    /// Interval between rollout batches; zero when no interval is configured
    pub fn rolling_interval(&self) -> Duration {
        Duration::from_secs(self.rolling_update().map(|r| r.interval).unwrap_or(0))
    }

    /// Owner reference pointing at this MCApp
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: API_VERSION.to_string(),
            kind: <Self as Resource>::KIND.to_string(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid,
        }
    }

    pub fn target(&self, project_name: &str) -> Option<&Target> {
        self.spec
            .targets
            .iter()
            .find(|t| t.project_name == project_name)
    }
}

/// Immutable snapshot of a completed rollout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiClusterAppRevision {
    pub metadata: ObjectMeta,
    pub template_version_name: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

crate::impl_resource!(
    MultiClusterAppRevision,
    "MultiClusterAppRevision",
    "multiclusterapprevisions"
);

impl MultiClusterAppRevision {
    /// Build an unsaved revision snapshotting `mcapp`'s current template and answers
    pub fn snapshot(mcapp: &MultiClusterApp) -> Self {
        let mut metadata = ObjectMeta {
            namespace: mcapp.metadata.namespace.clone(),
            generate_name: Some(REVISION_GENERATE_NAME.to_string()),
            owner_references: vec![mcapp.owner_reference()],
            ..Default::default()
        }
        .with_label(REVISION_MCAPP_LABEL, mcapp.metadata.name.clone());
        if let Some(creator) = mcapp.creator_id() {
            metadata = metadata.with_annotation(CREATOR_ID_ANNOTATION, creator);
        }
        Self {
            metadata,
            template_version_name: mcapp.spec.template_version_name.clone(),
            answers: mcapp.spec.answers.clone(),
        }
    }

    /// Whether this revision captures `mcapp`'s current template and answers
    pub fn matches(&self, mcapp: &MultiClusterApp) -> bool {
        self.template_version_name == mcapp.spec.template_version_name
            && self.answers == mcapp.spec.answers
    }
}
