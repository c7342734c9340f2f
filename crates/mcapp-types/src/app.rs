//! Per-project App and the template versions it is rendered from

use crate::condition::{ConditionType, Conditions};
use crate::mcapp::MCAPP_ID_LABEL;
use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    /// `cluster:project` the App is deployed into
    pub project_name: String,

    pub target_namespace: String,

    /// Catalog identifier of the rendered template
    pub external_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_cluster_app_name: Option<String>,

    #[serde(default)]
    pub answers: BTreeMap<String, String>,

    #[serde(default)]
    pub answers_set_string: BTreeMap<String, String>,

    #[serde(default)]
    pub wait: bool,

    #[serde(default)]
    pub timeout: u64,
}

/// Conditions are written by the deployment engine, never by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    #[serde(default)]
    pub conditions: Conditions,
}

/// Deployment of one template into one project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub metadata: ObjectMeta,
    pub spec: AppSpec,
    #[serde(default)]
    pub status: AppStatus,
}

crate::impl_resource!(App, "App", "apps");

impl App {
    /// Name of the MCApp this App belongs to, from its identity label
    pub fn mcapp_owner(&self) -> Option<&str> {
        self.metadata.label(MCAPP_ID_LABEL)
    }

    pub fn is_installed(&self) -> bool {
        self.status.conditions.is_true(ConditionType::Installed)
    }

    pub fn is_deployed(&self) -> bool {
        self.status.conditions.is_true(ConditionType::Deployed)
    }

    /// Installed and Deployed both True
    pub fn is_ready(&self) -> bool {
        self.is_installed() && self.is_deployed()
    }
}

/// Immutable catalog template revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub metadata: ObjectMeta,
    pub external_id: String,
}

crate::impl_resource!(TemplateVersion, "TemplateVersion", "templateversions");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_needs_both_conditions() {
        let mut app = App {
            metadata: ObjectMeta::named("p-1", "web-p-1").with_label(MCAPP_ID_LABEL, "web"),
            ..Default::default()
        };
        assert_eq!(app.mcapp_owner(), Some("web"));
        assert!(!app.is_ready());

        app.status.conditions.mark_true(ConditionType::Installed);
        assert!(app.is_installed());
        assert!(!app.is_ready());

        app.status.conditions.mark_true(ConditionType::Deployed);
        assert!(app.is_ready());
    }
}
