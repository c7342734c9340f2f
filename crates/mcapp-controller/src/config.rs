//! Controller configuration

use mcapp_store::ConflictRetry;
use mcapp_types::GLOBAL_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the control loop and its writers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Concurrent MCApp reconciliations
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Concurrent status reductions
    #[serde(default = "default_status_workers")]
    pub status_workers: usize,

    /// Writes attempted before a conflicting update gives up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Sleep between conflicting writes, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// First requeue delay after a failed sync, in milliseconds
    #[serde(default = "default_requeue_base_ms")]
    pub requeue_base_ms: u64,

    /// Upper bound on the requeue delay, in seconds
    #[serde(default = "default_requeue_max_secs")]
    pub requeue_max_secs: u64,

    /// Namespace holding MCApps, revisions and access objects
    #[serde(default = "default_global_namespace")]
    pub global_namespace: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            status_workers: default_status_workers(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            requeue_base_ms: default_requeue_base_ms(),
            requeue_max_secs: default_requeue_max_secs(),
            global_namespace: default_global_namespace(),
        }
    }
}

impl ControllerConfig {
    pub fn conflict_retry(&self) -> ConflictRetry {
        ConflictRetry::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn requeue_base(&self) -> Duration {
        Duration::from_millis(self.requeue_base_ms)
    }

    pub fn requeue_max(&self) -> Duration {
        Duration::from_secs(self.requeue_max_secs)
    }
}

// Default value helpers
fn default_workers() -> usize {
    5
}

fn default_status_workers() -> usize {
    2
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    5
}

fn default_requeue_base_ms() -> u64 {
    5
}

fn default_requeue_max_secs() -> u64 {
    1000
}

fn default_global_namespace() -> String {
    GLOBAL_NAMESPACE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.global_namespace, "cattle-global-data");
        assert_eq!(config.conflict_retry(), ConflictRetry::default());
        assert_eq!(config.requeue_max(), Duration::from_secs(1000));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ControllerConfig = serde_json::from_str(r#"{"workers": 12}"#).unwrap();
        assert_eq!(config.workers, 12);
        assert_eq!(config.status_workers, 2);
        assert_eq!(config.retry_attempts, 5);
    }
}
