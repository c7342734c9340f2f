//! Control loop
//!
//! Wires the watch feeds, work queues, reconcile and status workers
//! together and runs them until the shutdown signal flips.

use crate::config::ControllerConfig;
use crate::enqueue::{AppBridge, MultiClusterAppBridge, RoleBindingBridge, WatchHandler};
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::rollout::RolloutScheduler;
use crate::status::StatusWriter;
use crate::stores::Stores;
use futures::future::join_all;
use mcapp_store::{LabelSelector, WatchEvent};
use mcapp_types::{ObjectKey, Resource};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// The multi-cluster application controller
pub struct Controller {
    config: ControllerConfig,
    stores: Stores,
    reconcile_queue: Arc<WorkQueue>,
    status_queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    status: Arc<StatusWriter>,
}

impl Controller {
    pub fn new(config: ControllerConfig, stores: Stores) -> Self {
        let reconcile_queue =
            WorkQueue::new("multiclusterapps", config.requeue_base(), config.requeue_max());
        let status_queue = WorkQueue::new(
            "multiclusterapp-status",
            config.requeue_base(),
            config.requeue_max(),
        );
        let rollouts = Arc::new(RolloutScheduler::new(Arc::clone(&reconcile_queue)));
        let reconciler = Arc::new(Reconciler::new(
            stores.clone(),
            rollouts,
            config.global_namespace.clone(),
            config.conflict_retry(),
        ));
        let status = Arc::new(StatusWriter::new(stores.clone(), config.conflict_retry()));

        Self {
            config,
            stores,
            reconcile_queue,
            status_queue,
            reconciler,
            status,
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn status_writer(&self) -> &Arc<StatusWriter> {
        &self.status
    }

    pub fn reconcile_queue(&self) -> &Arc<WorkQueue> {
        &self.reconcile_queue
    }

    /// Run until `shutdown` becomes `true` or its sender is dropped
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            workers = self.config.workers,
            status_workers = self.config.status_workers,
            "MultiClusterApp controller starting"
        );

        // Subscribe before the initial listing so no change is missed
        let mcapp_events = self.stores.mcapps.watch();
        let app_events = self.stores.apps.watch();
        let binding_events = self.stores.role_bindings.watch();
        self.resync().await;

        let namespace = self.config.global_namespace.clone();
        let mut tasks: Vec<JoinHandle<()>> = vec![
            self.spawn_pump(
                "multiclusterapps",
                mcapp_events,
                Arc::new(MultiClusterAppBridge::new(
                    self.reconcile_queue.clone(),
                    self.status_queue.clone(),
                )),
                shutdown.clone(),
            ),
            self.spawn_pump(
                "apps",
                app_events,
                Arc::new(AppBridge::new(
                    self.reconcile_queue.clone(),
                    self.status_queue.clone(),
                    namespace.clone(),
                )),
                shutdown.clone(),
            ),
            self.spawn_pump(
                "rolebindings",
                binding_events,
                Arc::new(RoleBindingBridge::new(
                    self.reconcile_queue.clone(),
                    self.stores.clone(),
                    namespace,
                )),
                shutdown.clone(),
            ),
        ];

        for _ in 0..self.config.workers.max(1) {
            let reconciler = Arc::clone(&self.reconciler);
            tasks.push(spawn_worker(self.reconcile_queue.clone(), move |key| {
                let reconciler = Arc::clone(&reconciler);
                async move { reconciler.sync(&key).await }
            }));
        }
        for _ in 0..self.config.status_workers.max(1) {
            let status = Arc::clone(&self.status);
            tasks.push(spawn_worker(self.status_queue.clone(), move |key| {
                let status = Arc::clone(&status);
                async move { status.sync(&key).await.map(|_| ()) }
            }));
        }

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        tracing::info!("MultiClusterApp controller stopping");
        self.reconcile_queue.shutdown().await;
        self.status_queue.shutdown().await;
        join_all(tasks).await;
        self.reconciler.rollouts().shutdown().await;
        tracing::info!("MultiClusterApp controller stopped");
    }

    /// Enqueue every MCApp on both queues
    pub async fn resync(&self) {
        match self
            .stores
            .mcapps
            .list(Some(&self.config.global_namespace), &LabelSelector::everything())
            .await
        {
            Ok(mcapps) => {
                tracing::debug!(count = mcapps.len(), "Resyncing MultiClusterApps");
                for mcapp in mcapps {
                    let key = mcapp.key();
                    self.reconcile_queue.add(key.clone()).await;
                    self.status_queue.add(key).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to list MultiClusterApps"),
        }
    }

    fn spawn_pump<K: Resource>(
        self: &Arc<Self>,
        feed: &'static str,
        mut events: broadcast::Receiver<WatchEvent<K>>,
        handler: Arc<dyn WatchHandler<K>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) => handler.on_event(&event).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(feed, missed, "Watch lagged, resyncing");
                            controller.resync().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!(feed, "Watch pump stopped");
        })
    }
}

/// Worker draining `queue`; failed keys are requeued with backoff
fn spawn_worker<F, Fut>(queue: Arc<WorkQueue>, sync: F) -> JoinHandle<()>
where
    F: Fn(ObjectKey) -> Fut + Send + 'static,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(key) = queue.get().await {
            match sync(key.clone()).await {
                Ok(()) => queue.forget(&key).await,
                Err(e) => {
                    let delay = queue.add_rate_limited(key.clone()).await;
                    tracing::error!(
                        queue = queue.name(),
                        key = %key,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Sync failed"
                    );
                }
            }
            queue.done(&key).await;
        }
    })
}
