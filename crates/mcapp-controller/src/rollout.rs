//! Rollout Scheduler
//!
//! One timer per MCApp with an active rolling interval. A timer only
//! re-enqueues its MCApp; every rollout decision stays in the reconciler.

use crate::queue::WorkQueue;
use mcapp_types::ObjectKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

struct Timer {
    interval: Duration,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Registry of per-MCApp rollout timers
pub struct RolloutScheduler {
    queue: Arc<WorkQueue>,
    timers: Mutex<HashMap<ObjectKey, Timer>>,
    closed: AtomicBool,
}

impl RolloutScheduler {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self {
            queue,
            timers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Install a timer for `key`, replacing one with a different interval
    ///
    /// Returns `true` when a new timer was started. Nothing is installed
    /// once the scheduler has been shut down.
    pub async fn ensure(&self, key: &ObjectKey, interval: Duration) -> bool {
        if interval.is_zero() {
            return false;
        }

        let replaced = {
            let mut timers = self.timers.lock().await;
            if self.closed.load(Ordering::Acquire) {
                tracing::debug!(mcapp = %key, "Rollout scheduler closed, timer not started");
                return false;
            }
            if let Some(existing) = timers.get(key) {
                if existing.interval == interval {
                    return false;
                }
            }
            let replaced = timers.remove(key);
            timers.insert(key.clone(), self.spawn(key.clone(), interval));
            replaced
        };

        if let Some(old) = replaced {
            tracing::debug!(mcapp = %key, "Rollout interval changed, replacing timer");
            stop(key, old).await;
        }
        tracing::info!(
            mcapp = %key,
            interval_secs = interval.as_secs(),
            "Rollout timer started"
        );
        true
    }

    /// Stop and forget the timer for `key`; returns whether one existed
    pub async fn cancel(&self, key: &ObjectKey) -> bool {
        let removed = self.timers.lock().await.remove(key);
        match removed {
            Some(timer) => {
                stop(key, timer).await;
                tracing::info!(mcapp = %key, "Rollout timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop every timer and refuse new ones
    pub async fn shutdown(&self) {
        let timers: Vec<(ObjectKey, Timer)> = {
            let mut registry = self.timers.lock().await;
            self.closed.store(true, Ordering::Release);
            registry.drain().collect()
        };
        for (key, timer) in timers {
            stop(&key, timer).await;
        }
    }

    pub async fn is_scheduled(&self, key: &ObjectKey) -> bool {
        self.timers.lock().await.contains_key(key)
    }

    pub async fn interval(&self, key: &ObjectKey) -> Option<Duration> {
        self.timers.lock().await.get(key).map(|t| t.interval)
    }

    pub async fn len(&self) -> usize {
        self.timers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn spawn(&self, key: ObjectKey, interval: Duration) -> Timer {
        let (cancel, mut cancelled) = oneshot::channel();
        let queue = Arc::clone(&self.queue);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {
                        tracing::debug!(mcapp = %key, "Rollout interval elapsed");
                        queue.add(key.clone()).await;
                    }
                }
            }
        });
        Timer {
            interval,
            cancel,
            handle,
        }
    }
}

async fn stop(key: &ObjectKey, timer: Timer) {
    let _ = timer.cancel.send(());
    if let Err(e) = timer.handle.await {
        if e.is_panic() {
            tracing::warn!(mcapp = %key, error = %e, "Rollout timer task panicked");
        }
    }
}
