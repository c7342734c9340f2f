//! In-memory versioned object store
//!
//! Suitable for development, tests and the standalone daemon. Versions are
//! drawn from a single counter so every write yields a distinct version.

use crate::error::{Result, StoreError};
use crate::selector::LabelSelector;
use crate::store::{ObjectStore, WatchEvent};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mcapp_types::{ObjectKey, Resource};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

const WATCH_CAPACITY: usize = 1024;
const GENERATED_SUFFIX_LEN: usize = 5;

/// In-memory store for one resource kind
pub struct InMemoryStore<K: Resource> {
    objects: DashMap<ObjectKey, K>,
    version: AtomicU64,
    writes: AtomicU64,
    events: broadcast::Sender<WatchEvent<K>>,
}

impl<K: Resource> InMemoryStore<K> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: DashMap::new(),
            version: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            events,
        }
    }

    /// Number of successful create, update and delete calls so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Snapshot of every stored object
    pub fn all(&self) -> Vec<K> {
        self.objects.iter().map(|o| o.value().clone()).collect()
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_write(&self, event: WatchEvent<K>) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn generate_name(&self, namespace: &str, prefix: &str) -> String {
        loop {
            let suffix = Uuid::new_v4().simple().to_string();
            let name = format!("{}{}", prefix, &suffix[..GENERATED_SUFFIX_LEN]);
            if !self
                .objects
                .contains_key(&ObjectKey::new(namespace, name.as_str()))
            {
                return name;
            }
        }
    }
}

impl<K: Resource> Default for InMemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: Resource> ObjectStore<K> for InMemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        let key = ObjectKey::new(namespace, name);
        self.objects
            .get(&key)
            .map(|o| o.value().clone())
            .ok_or(StoreError::NotFound { kind: K::KIND, key })
    }

    async fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<K>> {
        let mut found: Vec<K> = self
            .objects
            .iter()
            .filter(|o| namespace.map_or(true, |ns| o.key().namespace == ns))
            .filter(|o| selector.matches(&o.value().meta().labels))
            .map(|o| o.value().clone())
            .collect();
        found.sort_by_key(|o| o.key());
        Ok(found)
    }

    async fn create(&self, mut object: K) -> Result<K> {
        let meta = object.meta_mut();
        if meta.name.is_empty() {
            match meta.generate_name.clone() {
                Some(prefix) if !prefix.is_empty() => {
                    meta.name = self.generate_name(&meta.namespace, &prefix);
                }
                _ => {
                    return Err(StoreError::Invalid(format!(
                        "{} requires a name or generate_name",
                        K::KIND
                    )))
                }
            }
        }

        let key = object.key();
        let created = match self.objects.entry(key.clone()) {
            Entry::Occupied(_) => return Err(StoreError::AlreadyExists { kind: K::KIND, key }),
            Entry::Vacant(slot) => {
                let meta = object.meta_mut();
                meta.uid = Uuid::new_v4();
                meta.resource_version = self.next_version();
                slot.insert(object.clone());
                object
            }
        };

        tracing::trace!(kind = K::KIND, key = %key, "Object created");
        self.record_write(WatchEvent::Added(created.clone()));
        Ok(created)
    }

    async fn update(&self, mut object: K) -> Result<K> {
        let key = object.key();
        let updated = {
            let mut stored = self
                .objects
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound {
                    kind: K::KIND,
                    key: key.clone(),
                })?;

            let current = stored.meta().resource_version;
            let expected = object.meta().resource_version;
            if current != expected {
                return Err(StoreError::Conflict {
                    kind: K::KIND,
                    key,
                    expected,
                    current,
                });
            }

            let meta = object.meta_mut();
            meta.uid = stored.meta().uid;
            meta.resource_version = self.next_version();
            *stored = object.clone();
            object
        };

        tracing::trace!(kind = K::KIND, key = %key, "Object updated");
        self.record_write(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let key = ObjectKey::new(namespace, name);
        match self.objects.remove(&key) {
            Some((_, removed)) => {
                tracing::trace!(kind = K::KIND, key = %key, "Object deleted");
                self.record_write(WatchEvent::Deleted(removed));
                Ok(())
            }
            None => Err(StoreError::NotFound { kind: K::KIND, key }),
        }
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent<K>> {
        self.events.subscribe()
    }
}
