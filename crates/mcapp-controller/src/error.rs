//! Controller error types

use mcapp_store::StoreError;
use mcapp_types::{AccessTier, ObjectKey, TypeError};
use thiserror::Error;

/// Errors returned by a sync; every one is retried by the work queue
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("MultiClusterApp {0} has no creator annotation, cannot create apps")]
    MissingCreator(String),

    #[error("App {app} is not labelled for MultiClusterApp {expected} (found {found:?})")]
    ForeignApp {
        app: ObjectKey,
        expected: String,
        found: Option<String>,
    },

    #[error("Invalid project name {0:?}: expected <cluster>:<project>")]
    InvalidProjectName(String),

    #[error("Invalid template version {0:?}")]
    InvalidTemplateVersion(String),

    #[error("Invalid work key: {0}")]
    InvalidKey(String),

    #[error("Failed to delete {} app(s): {}", .0.len(), join(.0))]
    Deletion(Vec<StoreError>),

    #[error("Failed to ensure access for {} tier(s): {}", .0.len(), join_tiers(.0))]
    Access(Vec<(AccessTier, StoreError)>),
}

impl From<TypeError> for ControllerError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidProjectName(name) => ControllerError::InvalidProjectName(name),
            TypeError::InvalidTemplateVersion(name) => {
                ControllerError::InvalidTemplateVersion(name)
            }
            TypeError::InvalidKey(key) => ControllerError::InvalidKey(key),
        }
    }
}

fn join(errors: &[StoreError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_tiers(errors: &[(AccessTier, StoreError)]) -> String {
    errors
        .iter()
        .map(|(tier, e)| format!("{}: {}", tier, e))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;
