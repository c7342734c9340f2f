//! Store handles used by the controller

use mcapp_store::{InMemoryStore, ObjectStore};
use mcapp_types::{App, MultiClusterApp, MultiClusterAppRevision, Role, RoleBinding, TemplateVersion};
use std::sync::Arc;

/// One store per resource kind the controller reads or writes
#[derive(Clone)]
pub struct Stores {
    pub mcapps: Arc<dyn ObjectStore<MultiClusterApp>>,
    pub revisions: Arc<dyn ObjectStore<MultiClusterAppRevision>>,
    pub apps: Arc<dyn ObjectStore<App>>,
    pub template_versions: Arc<dyn ObjectStore<TemplateVersion>>,
    pub roles: Arc<dyn ObjectStore<Role>>,
    pub role_bindings: Arc<dyn ObjectStore<RoleBinding>>,
}

/// Concrete in-memory stores, kept alongside their trait-object view
#[derive(Clone, Default)]
pub struct InMemoryStores {
    pub mcapps: Arc<InMemoryStore<MultiClusterApp>>,
    pub revisions: Arc<InMemoryStore<MultiClusterAppRevision>>,
    pub apps: Arc<InMemoryStore<App>>,
    pub template_versions: Arc<InMemoryStore<TemplateVersion>>,
    pub roles: Arc<InMemoryStore<Role>>,
    pub role_bindings: Arc<InMemoryStore<RoleBinding>>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        Stores {
            mcapps: self.mcapps.clone(),
            revisions: self.revisions.clone(),
            apps: self.apps.clone(),
            template_versions: self.template_versions.clone(),
            roles: self.roles.clone(),
            role_bindings: self.role_bindings.clone(),
        }
    }

    /// Total successful writes across every store
    pub fn writes(&self) -> u64 {
        self.mcapps.writes()
            + self.revisions.writes()
            + self.apps.writes()
            + self.template_versions.writes()
            + self.roles.writes()
            + self.role_bindings.writes()
    }
}
