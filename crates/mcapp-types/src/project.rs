//! Project name parsing
//!
//! Projects are addressed as `<cluster>:<project>`; the project part is also
//! the namespace that holds the project's Apps.

use crate::error::{Result, TypeError};

/// Borrowed view of a parsed project name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectRef<'a> {
    pub cluster: &'a str,
    pub namespace: &'a str,
}

/// Split `<cluster>:<project>` into its parts
pub fn split_project_name(project_name: &str) -> Result<ProjectRef<'_>> {
    match project_name.split_once(':') {
        Some((cluster, namespace)) if !cluster.is_empty() && !namespace.is_empty() => {
            Ok(ProjectRef { cluster, namespace })
        }
        _ => Err(TypeError::InvalidProjectName(project_name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_project_name() {
        let p = split_project_name("c-1:p-1").unwrap();
        assert_eq!(p.cluster, "c-1");
        assert_eq!(p.namespace, "p-1");
    }

    #[test]
    fn test_split_keeps_remaining_colons_in_namespace() {
        let p = split_project_name("c-1:p:x").unwrap();
        assert_eq!(p.namespace, "p:x");
    }

    #[test]
    fn test_split_rejects_malformed() {
        assert!(split_project_name("p-1").is_err());
        assert!(split_project_name(":p-1").is_err());
        assert!(split_project_name("c-1:").is_err());
    }
}
