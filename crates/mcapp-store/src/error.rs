//! Store error types

use mcapp_types::ObjectKey;
use thiserror::Error;

/// Object store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} was modified: expected version {expected}, stored {current}")]
    Conflict {
        kind: &'static str,
        key: ObjectKey,
        expected: u64,
        current: u64,
    },

    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: ObjectKey },

    #[error("Invalid object: {0}")]
    Invalid(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
