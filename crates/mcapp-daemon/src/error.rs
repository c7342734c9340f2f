//! Daemon error types

use thiserror::Error;

/// Errors that stop the daemon from starting
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read manifest {path}: {source}")]
    ManifestIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest {path}: {source}")]
    ManifestParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to seed {kind} {key}: {source}")]
    Seed {
        kind: &'static str,
        key: String,
        #[source]
        source: mcapp_store::StoreError,
    },
}

impl From<::config::ConfigError> for DaemonError {
    fn from(err: ::config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
