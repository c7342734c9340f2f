//! Errors raised while interpreting resource fields

use thiserror::Error;

/// Malformed identifiers found on a resource
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("Invalid project name {0:?}: expected <cluster>:<project>")]
    InvalidProjectName(String),

    #[error("Invalid template version {0:?}: expected <namespace>:<name>")]
    InvalidTemplateVersion(String),

    #[error("Invalid object key {0:?}")]
    InvalidKey(String),
}

/// Result type for resource parsing
pub type Result<T> = std::result::Result<T, TypeError>;
