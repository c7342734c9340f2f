//! Read-modify-write with bounded conflict retry

use crate::error::Result;
use crate::store::ObjectStore;
use mcapp_types::Resource;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(5);

/// Retry policy for writes that race other writers
///
/// `update` writes the caller's object. When the store reports a conflict
/// the freshest copy is fetched, `merge` reapplies the caller-owned fields,
/// and the write is attempted again, at most `attempts` writes in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl ConflictRetry {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Write `desired`, re-merging onto the stored copy after each conflict
    ///
    /// If merging leaves the fresh copy unchanged, it is returned without a write.
    pub async fn update<K, S, F>(&self, store: &S, desired: K, merge: F) -> Result<K>
    where
        K: Resource + PartialEq,
        S: ObjectStore<K> + ?Sized,
        F: Fn(&mut K) + Send + Sync,
    {
        let key = desired.key();
        let mut object = desired;
        let mut attempt = 1;

        loop {
            match store.update(object).await {
                Ok(updated) => return Ok(updated),
                Err(e) if e.is_conflict() && attempt < self.attempts => {
                    tracing::debug!(
                        kind = K::KIND,
                        key = %key,
                        attempt,
                        "Write conflicted, retrying on fresh copy"
                    );
                    tokio::time::sleep(self.backoff).await;

                    let fresh = store.get(&key.namespace, &key.name).await?;
                    let mut merged = fresh.clone();
                    merge(&mut merged);
                    if merged == fresh {
                        return Ok(fresh);
                    }
                    object = merged;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
