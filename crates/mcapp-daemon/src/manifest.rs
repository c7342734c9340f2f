//! Startup manifest
//!
//! A JSON document listing template versions and MCApps to load into the
//! in-memory stores before the controller starts:
//!
//! ```json
//! {
//!   "template_versions": [
//!     { "metadata": { "name": "nginx-1.0.0" }, "external_id": "catalog://?catalog=library&template=nginx&version=1.0.0" }
//!   ],
//!   "multi_cluster_apps": [
//!     { "metadata": { "name": "web", "annotations": { "field.cattle.io/creatorId": "u-1" } },
//!       "spec": { "template_version_name": "cattle-global-data:nginx-1.0.0", "targets": [ { "project_name": "c-1:p-1" } ] } }
//!   ]
//! }
//! ```
//!
//! Objects without a namespace land in the global namespace.

use crate::error::{DaemonError, DaemonResult};
use mcapp_controller::InMemoryStores;
use mcapp_store::ObjectStore;
use mcapp_types::{MultiClusterApp, Resource, TemplateVersion};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Objects seeded at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub template_versions: Vec<TemplateVersion>,

    #[serde(default)]
    pub multi_cluster_apps: Vec<MultiClusterApp>,
}

impl Manifest {
    pub async fn load(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DaemonError::ManifestIo {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&raw).map_err(|source| DaemonError::ManifestParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Create every object; ones that already exist are left alone
    ///
    /// Returns the number of objects created.
    pub async fn seed(
        self,
        stores: &InMemoryStores,
        global_namespace: &str,
    ) -> DaemonResult<usize> {
        let mut created = 0;
        for version in self.template_versions {
            if seed_one(&*stores.template_versions, version, global_namespace).await? {
                created += 1;
            }
        }
        for mcapp in self.multi_cluster_apps {
            if seed_one(&*stores.mcapps, mcapp, global_namespace).await? {
                created += 1;
            }
        }
        Ok(created)
    }
}

async fn seed_one<K, S>(store: &S, mut object: K, global_namespace: &str) -> DaemonResult<bool>
where
    K: Resource,
    S: ObjectStore<K> + ?Sized,
{
    if object.meta().namespace.is_empty() {
        object.meta_mut().namespace = global_namespace.to_string();
    }
    let key = object.key();

    match store.create(object).await {
        Ok(_) => {
            tracing::info!(kind = K::KIND, key = %key, "Seeded from manifest");
            Ok(true)
        }
        Err(e) if e.is_already_exists() => {
            tracing::warn!(kind = K::KIND, key = %key, "Already present, skipping");
            Ok(false)
        }
        Err(source) => Err(DaemonError::Seed {
            kind: K::KIND,
            key: key.to_string(),
            source,
        }),
    }
}
