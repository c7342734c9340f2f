#![allow(dead_code)]

use async_trait::async_trait;
use mcapp_controller::{
    InMemoryStores, Reconciler, RolloutScheduler, StatusWriter, Stores, WorkQueue,
};
use mcapp_store::{
    ConflictRetry, InMemoryStore, LabelSelector, ObjectStore, StoreError, WatchEvent,
};
use mcapp_types::{
    Answer, App, ConditionType, MultiClusterApp, MultiClusterAppSpec, ObjectKey, ObjectMeta,
    Resource, RollingUpdate, Target, TemplateVersion, UpgradeStrategy, CREATOR_ID_ANNOTATION,
    GLOBAL_NAMESPACE,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const NGINX_1_0: &str = "cattle-global-data:nginx-1.0.0";
pub const NGINX_1_1: &str = "cattle-global-data:nginx-1.1.0";
pub const CREATOR: &str = "u-creator";

pub fn external_id(version: &str) -> String {
    format!("catalog://?catalog=library&template=nginx&version={}", version)
}

pub fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// MCApp owned by [`CREATOR`] with one global answer
pub fn mcapp(name: &str, projects: &[&str], rolling: Option<(usize, u64)>) -> MultiClusterApp {
    let mut mcapp = MultiClusterApp::new(
        name,
        MultiClusterAppSpec {
            template_version_name: NGINX_1_0.to_string(),
            answers: vec![Answer::global(values(&[("replicas", "1")]))],
            targets: projects.iter().map(|p| Target::new(*p)).collect(),
            upgrade_strategy: UpgradeStrategy {
                rolling_update: rolling.map(|(batch_size, interval)| RollingUpdate {
                    batch_size,
                    interval,
                }),
            },
            ..Default::default()
        },
    );
    mcapp.metadata = mcapp
        .metadata
        .with_annotation(CREATOR_ID_ANNOTATION, CREATOR);
    mcapp
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(GLOBAL_NAMESPACE, name)
}

pub struct Fixture {
    pub stores: InMemoryStores,
    pub queue: Arc<WorkQueue>,
    pub rollouts: Arc<RolloutScheduler>,
    pub reconciler: Reconciler,
    pub status: StatusWriter,
}

/// In-memory stores holding the two nginx template versions
pub async fn seeded_stores() -> InMemoryStores {
    let stores = InMemoryStores::new();
    for (name, version) in [("nginx-1.0.0", "1.0.0"), ("nginx-1.1.0", "1.1.0")] {
        stores
            .template_versions
            .create(TemplateVersion {
                metadata: ObjectMeta::named(GLOBAL_NAMESPACE, name),
                external_id: external_id(version),
            })
            .await
            .unwrap();
    }
    stores
}

impl Fixture {
    pub async fn new() -> Self {
        let stores = seeded_stores().await;
        let view = stores.stores();
        Self::with_view(stores, view)
    }

    /// Reconcile through `view` while `stores` stays directly writable
    pub fn with_view(stores: InMemoryStores, view: Stores) -> Self {
        let queue = WorkQueue::new("test", Duration::from_millis(5), Duration::from_secs(1));
        let rollouts = Arc::new(RolloutScheduler::new(queue.clone()));
        let reconciler = Reconciler::new(
            view.clone(),
            rollouts.clone(),
            GLOBAL_NAMESPACE,
            ConflictRetry::default(),
        );
        let status = StatusWriter::new(view, ConflictRetry::default());

        Self {
            stores,
            queue,
            rollouts,
            reconciler,
            status,
        }
    }

    pub async fn create(&self, mcapp: MultiClusterApp) -> MultiClusterApp {
        self.stores.mcapps.create(mcapp).await.unwrap()
    }

    pub async fn sync(&self, name: &str) -> mcapp_controller::Result<()> {
        self.reconciler.sync(&key(name)).await
    }

    pub async fn mcapp(&self, name: &str) -> MultiClusterApp {
        self.stores.mcapps.get(GLOBAL_NAMESPACE, name).await.unwrap()
    }

    /// Apply `edit` to the stored MCApp, as its creator would
    pub async fn edit(&self, name: &str, edit: impl Fn(&mut MultiClusterApp) + Send + Sync) {
        let mut mcapp = self.mcapp(name).await;
        edit(&mut mcapp);
        ConflictRetry::default()
            .update(&*self.stores.mcapps, mcapp, edit)
            .await
            .unwrap();
    }

    pub async fn app(&self, namespace: &str, name: &str) -> Option<App> {
        match self.stores.apps.get(namespace, name).await {
            Ok(app) => Some(app),
            Err(e) if e.is_not_found() => None,
            Err(e) => panic!("unexpected store error: {}", e),
        }
    }

    /// Play the deployment engine: mark the App installed and deployed
    pub async fn mark_ready(&self, namespace: &str, name: &str) {
        self.set_conditions(namespace, name, true).await;
    }

    /// Play the deployment engine: an upgrade is in flight on this App
    pub async fn mark_installing(&self, namespace: &str, name: &str) {
        self.set_conditions(namespace, name, false).await;
    }

    async fn set_conditions(&self, namespace: &str, name: &str, ready: bool) {
        let apply = move |app: &mut App| {
            if ready {
                app.status.conditions.mark_true(ConditionType::Installed);
                app.status.conditions.mark_true(ConditionType::Deployed);
            } else {
                app.status
                    .conditions
                    .mark_upgrading(ConditionType::Installed, chrono::Utc::now());
            }
        };
        let mut app = self.stores.apps.get(namespace, name).await.unwrap();
        apply(&mut app);
        ConflictRetry::default()
            .update(&*self.stores.apps, app, apply)
            .await
            .unwrap();
    }

    pub async fn mark_all_ready(&self) {
        for app in self.stores.apps.all() {
            self.mark_ready(&app.metadata.namespace, &app.metadata.name)
                .await;
        }
    }

    /// Pretend the current rollout batch started `secs` seconds earlier
    pub async fn backdate_rollout(&self, name: &str, secs: i64) {
        self.edit(name, move |mcapp| {
            if let Some(since) = mcapp
                .status
                .conditions
                .upgrading_since(ConditionType::Installed)
            {
                mcapp.status.conditions.mark_upgrading(
                    ConditionType::Installed,
                    since - chrono::Duration::seconds(secs),
                );
            }
        })
        .await;
    }

    pub fn app_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .stores
            .apps
            .all()
            .into_iter()
            .map(|a| a.metadata.name)
            .collect();
        names.sort();
        names
    }
}

type Edit<K> = Box<dyn FnOnce(&mut K) + Send>;

enum Trigger {
    /// Before the next `update`, on the object being updated
    Update,
    /// On the nth `get` from now, before the read
    Get(usize),
}

/// Store that lets a test interleave other writers with the controller
pub struct Interleaved<K: Resource> {
    inner: Arc<InMemoryStore<K>>,
    get_delay: Duration,
    gets: AtomicUsize,
    pending: Mutex<Option<(Trigger, Edit<K>)>>,
    failing_deletes: Mutex<HashSet<String>>,
    vanishing: Mutex<HashSet<String>>,
}

impl<K: Resource> Interleaved<K> {
    pub fn new(inner: Arc<InMemoryStore<K>>) -> Self {
        Self {
            inner,
            get_delay: Duration::ZERO,
            gets: AtomicUsize::new(0),
            pending: Mutex::new(None),
            failing_deletes: Mutex::new(HashSet::new()),
            vanishing: Mutex::new(HashSet::new()),
        }
    }

    /// Every `get` sleeps for `delay` first
    pub fn slow_gets(mut self, delay: Duration) -> Self {
        self.get_delay = delay;
        self
    }

    /// Another writer applies `edit` to the stored copy right before the next update
    pub fn before_update(&self, edit: impl FnOnce(&mut K) + Send + 'static) {
        *self.pending.lock().unwrap() = Some((Trigger::Update, Box::new(edit)));
    }

    /// Another writer applies `edit` right before the `nth` get from now
    pub fn before_get(&self, nth: usize, edit: impl FnOnce(&mut K) + Send + 'static) {
        self.gets.store(0, Ordering::SeqCst);
        *self.pending.lock().unwrap() = Some((Trigger::Get(nth), Box::new(edit)));
    }

    /// Deleting `name` fails with a backend error
    pub fn fail_delete(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }

    /// `name` is removed by someone else just before the controller deletes it
    pub fn vanish_on_delete(&self, name: &str) {
        self.vanishing.lock().unwrap().insert(name.to_string());
    }

    fn take(&self, fire: impl FnOnce(&Trigger) -> bool) -> Option<Edit<K>> {
        let mut pending = self.pending.lock().unwrap();
        let fires = matches!(pending.as_ref(), Some((trigger, _)) if fire(trigger));
        if fires {
            pending.take().map(|(_, edit)| edit)
        } else {
            None
        }
    }

    async fn interleave(&self, namespace: &str, name: &str, edit: Edit<K>) {
        let mut stored = self.inner.get(namespace, name).await.unwrap();
        edit(&mut stored);
        self.inner.update(stored).await.unwrap();
    }
}

#[async_trait]
impl<K: Resource> ObjectStore<K> for Interleaved<K> {
    async fn get(&self, namespace: &str, name: &str) -> mcapp_store::Result<K> {
        if !self.get_delay.is_zero() {
            tokio::time::sleep(self.get_delay).await;
        }
        let count = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(edit) = self.take(|t| matches!(t, Trigger::Get(n) if *n == count)) {
            self.interleave(namespace, name, edit).await;
        }
        self.inner.get(namespace, name).await
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> mcapp_store::Result<Vec<K>> {
        self.inner.list(namespace, selector).await
    }

    async fn create(&self, object: K) -> mcapp_store::Result<K> {
        self.inner.create(object).await
    }

    async fn update(&self, object: K) -> mcapp_store::Result<K> {
        if let Some(edit) = self.take(|t| matches!(t, Trigger::Update)) {
            let key = object.key();
            self.interleave(&key.namespace, &key.name, edit).await;
        }
        self.inner.update(object).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> mcapp_store::Result<()> {
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(StoreError::Backend(format!("delete of {} refused", name)));
        }
        if self.vanishing.lock().unwrap().contains(name) {
            self.inner.delete(namespace, name).await?;
        }
        self.inner.delete(namespace, name).await
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent<K>> {
        self.inner.watch()
    }
}
