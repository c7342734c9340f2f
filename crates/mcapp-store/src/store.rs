//! Generic typed store contract

use crate::error::Result;
use crate::selector::LabelSelector;
use async_trait::async_trait;
use mcapp_types::Resource;
use tokio::sync::broadcast;

/// A change observed on the store
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K> WatchEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }

    pub fn into_object(self) -> K {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }
}

/// Versioned store for one resource kind
///
/// Every write that succeeds returns the stored object with its new
/// `resource_version`. Callers that race other writers go through
/// [`crate::ConflictRetry`].
#[async_trait]
pub trait ObjectStore<K: Resource>: Send + Sync {
    /// Fetch one object; `NotFound` when absent
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;

    /// List objects matching `selector`, in one namespace or across all of them
    async fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<K>>;

    /// Create an object; `AlreadyExists` when the key is taken
    async fn create(&self, object: K) -> Result<K>;

    /// Replace an object; `Conflict` unless `object`'s version is current
    async fn update(&self, object: K) -> Result<K>;

    /// Delete an object; `NotFound` when absent
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Subscribe to changes made after this call
    fn watch(&self) -> broadcast::Receiver<WatchEvent<K>>;
}
