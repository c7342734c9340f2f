//! Enqueue Bridges
//!
//! Translate changes on collaborator resources into MCApp work keys.

use crate::queue::WorkQueue;
use crate::stores::Stores;
use async_trait::async_trait;
use mcapp_store::{LabelSelector, WatchEvent};
use mcapp_types::{
    App, MultiClusterApp, MultiClusterAppRevision, ObjectKey, Resource, RoleBinding,
    ACCESS_RESOURCE_NAME_LABEL, ACCESS_RESOURCE_TYPE_LABEL, REVISION_MCAPP_LABEL,
};
use std::sync::Arc;

/// Consumer of one kind's change feed
#[async_trait]
pub trait WatchHandler<K>: Send + Sync {
    async fn on_event(&self, event: &WatchEvent<K>);
}

/// Routes MCApp changes to the reconcile and status queues
pub struct MultiClusterAppBridge {
    reconcile: Arc<WorkQueue>,
    status: Arc<WorkQueue>,
}

impl MultiClusterAppBridge {
    pub fn new(reconcile: Arc<WorkQueue>, status: Arc<WorkQueue>) -> Self {
        Self { reconcile, status }
    }
}

#[async_trait]
impl WatchHandler<MultiClusterApp> for MultiClusterAppBridge {
    async fn on_event(&self, event: &WatchEvent<MultiClusterApp>) {
        let key = event.object().key();
        self.reconcile.add(key.clone()).await;
        if !matches!(event, WatchEvent::Deleted(_)) {
            self.status.add(key).await;
        }
    }
}

/// Routes App changes to the owning MCApp's reconcile and status queues
pub struct AppBridge {
    reconcile: Arc<WorkQueue>,
    status: Arc<WorkQueue>,
    namespace: String,
}

impl AppBridge {
    pub fn new(reconcile: Arc<WorkQueue>, status: Arc<WorkQueue>, namespace: impl Into<String>) -> Self {
        Self {
            reconcile,
            status,
            namespace: namespace.into(),
        }
    }

    /// Key of the MCApp that owns `app`, if any
    pub fn owner_key(&self, app: &App) -> Option<ObjectKey> {
        app.mcapp_owner()
            .map(|owner| ObjectKey::new(self.namespace.as_str(), owner))
    }
}

#[async_trait]
impl WatchHandler<App> for AppBridge {
    async fn on_event(&self, event: &WatchEvent<App>) {
        let Some(key) = self.owner_key(event.object()) else {
            return;
        };
        tracing::trace!(app = %event.object().key(), mcapp = %key, "App changed");
        self.reconcile.add(key.clone()).await;
        self.status.add(key).await;
    }
}

/// Routes RoleBinding changes to the MCApps whose access they carry
///
/// Bindings created for an MCApp or one of its revisions enqueue that
/// MCApp. Any other binding in the global namespace may affect every
/// MCApp there, so all of them are enqueued.
pub struct RoleBindingBridge {
    reconcile: Arc<WorkQueue>,
    stores: Stores,
    namespace: String,
}

impl RoleBindingBridge {
    pub fn new(reconcile: Arc<WorkQueue>, stores: Stores, namespace: impl Into<String>) -> Self {
        Self {
            reconcile,
            stores,
            namespace: namespace.into(),
        }
    }

    async fn revision_owner(&self, revision: &str) -> Option<ObjectKey> {
        match self.stores.revisions.get(&self.namespace, revision).await {
            Ok(revision) => revision
                .metadata
                .label(REVISION_MCAPP_LABEL)
                .map(|owner| ObjectKey::new(self.namespace.as_str(), owner)),
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(revision, error = %e, "Failed to resolve revision owner");
                }
                None
            }
        }
    }

    async fn enqueue_all(&self) {
        match self
            .stores
            .mcapps
            .list(Some(&self.namespace), &LabelSelector::everything())
            .await
        {
            Ok(mcapps) => {
                for mcapp in mcapps {
                    self.reconcile.add(mcapp.key()).await;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to list MultiClusterApps"),
        }
    }
}

#[async_trait]
impl WatchHandler<RoleBinding> for RoleBindingBridge {
    async fn on_event(&self, event: &WatchEvent<RoleBinding>) {
        let binding = event.object();
        let meta = &binding.metadata;

        let resource = (
            meta.label(ACCESS_RESOURCE_TYPE_LABEL),
            meta.label(ACCESS_RESOURCE_NAME_LABEL),
        );
        match resource {
            (Some(kind), Some(name)) if kind == MultiClusterApp::PLURAL => {
                self.reconcile
                    .add(ObjectKey::new(self.namespace.as_str(), name))
                    .await;
            }
            (Some(kind), Some(name)) if kind == MultiClusterAppRevision::PLURAL => {
                if let Some(key) = self.revision_owner(name).await {
                    self.reconcile.add(key).await;
                }
            }
            _ if meta.namespace == self.namespace => self.enqueue_all().await,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryStores;
    use mcapp_store::ObjectStore;
    use mcapp_types::{ObjectMeta, GLOBAL_NAMESPACE, MCAPP_ID_LABEL};
    use std::time::Duration;

    fn queue(name: &'static str) -> Arc<WorkQueue> {
        WorkQueue::new(name, Duration::from_millis(5), Duration::from_secs(1))
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(GLOBAL_NAMESPACE, name)
    }

    #[tokio::test]
    async fn test_app_event_enqueues_owner_on_both_queues() {
        let (reconcile, status) = (queue("reconcile"), queue("status"));
        let bridge = AppBridge::new(reconcile.clone(), status.clone(), GLOBAL_NAMESPACE);

        let app = App {
            metadata: ObjectMeta::named("p-1", "web-p-1").with_label(MCAPP_ID_LABEL, "web"),
            ..Default::default()
        };
        bridge.on_event(&WatchEvent::Modified(app)).await;
        bridge
            .on_event(&WatchEvent::Added(App::default()))
            .await;

        assert_eq!(reconcile.get().await, Some(key("web")));
        assert_eq!(status.get().await, Some(key("web")));
        assert!(reconcile.is_empty().await);
    }

    fn binding(namespace: &str, labels: &[(&str, &str)]) -> RoleBinding {
        let mut metadata = ObjectMeta::named(namespace, "binding");
        for (k, v) in labels {
            metadata = metadata.with_label(*k, *v);
        }
        RoleBinding {
            metadata,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_access_binding_enqueues_its_mcapp() {
        let stores = InMemoryStores::new();
        let reconcile = queue("reconcile");
        let bridge = RoleBindingBridge::new(reconcile.clone(), stores.stores(), GLOBAL_NAMESPACE);

        let event = WatchEvent::Deleted(binding(
            GLOBAL_NAMESPACE,
            &[
                (ACCESS_RESOURCE_TYPE_LABEL, "multiclusterapps"),
                (ACCESS_RESOURCE_NAME_LABEL, "web"),
            ],
        ));
        bridge.on_event(&event).await;
        assert_eq!(reconcile.get().await, Some(key("web")));
    }

    #[tokio::test]
    async fn test_revision_binding_enqueues_owning_mcapp() {
        let stores = InMemoryStores::new();
        stores
            .revisions
            .create(MultiClusterAppRevision {
                metadata: ObjectMeta::named(GLOBAL_NAMESPACE, "mcapprevision-abcde")
                    .with_label(REVISION_MCAPP_LABEL, "web"),
                ..Default::default()
            })
            .await
            .unwrap();
        let reconcile = queue("reconcile");
        let bridge = RoleBindingBridge::new(reconcile.clone(), stores.stores(), GLOBAL_NAMESPACE);

        let event = WatchEvent::Modified(binding(
            GLOBAL_NAMESPACE,
            &[
                (ACCESS_RESOURCE_TYPE_LABEL, "multiclusterapprevisions"),
                (ACCESS_RESOURCE_NAME_LABEL, "mcapprevision-abcde"),
            ],
        ));
        bridge.on_event(&event).await;
        assert_eq!(reconcile.get().await, Some(key("web")));
    }

    #[tokio::test]
    async fn test_foreign_binding_enqueues_all_in_global_namespace() {
        let stores = InMemoryStores::new();
        for name in ["web", "db"] {
            stores
                .mcapps
                .create(MultiClusterApp::new(name, Default::default()))
                .await
                .unwrap();
        }
        let reconcile = queue("reconcile");
        let bridge = RoleBindingBridge::new(reconcile.clone(), stores.stores(), GLOBAL_NAMESPACE);

        bridge
            .on_event(&WatchEvent::Added(binding(GLOBAL_NAMESPACE, &[])))
            .await;
        assert_eq!(reconcile.len().await, 2);

        bridge
            .on_event(&WatchEvent::Added(binding("p-1", &[])))
            .await;
        assert_eq!(reconcile.len().await, 2);
    }
}
