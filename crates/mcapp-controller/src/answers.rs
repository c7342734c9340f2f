//! Answer Resolver
//!
//! Builds the per-scope answer maps for an MCApp. Global answers are the
//! base; cluster answers override global; project answers override their
//! cluster's resolved answers, or global when the cluster has none. All
//! merging happens here, so lookups are a plain fallback chain.

use crate::error::Result;
use mcapp_types::{split_project_name, Answer};
use std::collections::{BTreeMap, HashMap};

/// Resolved answers for one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeAnswers {
    pub values: BTreeMap<String, String>,
    pub values_set_string: BTreeMap<String, String>,
}

impl ScopeAnswers {
    fn from_answer(answer: &Answer) -> Self {
        Self {
            values: answer.values.clone(),
            values_set_string: answer.values_set_string.clone(),
        }
    }

    /// `self` overlaid with `answer`; keys from `answer` win
    fn overlay(&self, answer: &Answer) -> Self {
        let mut merged = self.clone();
        merged.values.extend(answer.values.clone());
        merged
            .values_set_string
            .extend(answer.values_set_string.clone());
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Scope {
    Global,
    Cluster(String),
    Project(String),
}

/// Scope-keyed answers for one MCApp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAnswers {
    scopes: HashMap<Scope, ScopeAnswers>,
}

impl ResolvedAnswers {
    /// Answers for `project_name`: project, then its cluster, then global, then empty
    pub fn for_project(&self, project_name: &str) -> ScopeAnswers {
        let cluster = project_name
            .split_once(':')
            .map_or(project_name, |(cluster, _)| cluster);

        self.scopes
            .get(&Scope::Project(project_name.to_string()))
            .or_else(|| self.scopes.get(&Scope::Cluster(cluster.to_string())))
            .or_else(|| self.scopes.get(&Scope::Global))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Build the scope map from an MCApp's answer list
///
/// An unscoped entry is the global default; if several are present the
/// last one wins. A project scope that is not `cluster:project` is an error.
pub fn resolve(answers: &[Answer]) -> Result<ResolvedAnswers> {
    let mut scopes = HashMap::new();
    let mut global = ScopeAnswers::default();

    for answer in answers {
        if answer.project_name.is_none() && answer.cluster_name.is_none() {
            global = ScopeAnswers::from_answer(answer);
            scopes.insert(Scope::Global, global.clone());
        }
    }

    for answer in answers {
        if let Some(cluster) = &answer.cluster_name {
            scopes.insert(Scope::Cluster(cluster.clone()), global.overlay(answer));
        }
    }

    for answer in answers {
        if let Some(project) = &answer.project_name {
            let project_ref = split_project_name(project)?;
            let base = scopes
                .get(&Scope::Cluster(project_ref.cluster.to_string()))
                .unwrap_or(&global);
            let resolved = base.overlay(answer);
            scopes.insert(Scope::Project(project.clone()), resolved);
        }
    }

    Ok(ResolvedAnswers { scopes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_project_overrides_cluster_overrides_global() {
        let answers = vec![
            Answer::for_project("c-1:p-1", map(&[("c", "project")])),
            Answer::for_cluster("c-1", map(&[("b", "cluster"), ("c", "cluster")])),
            Answer::global(map(&[("a", "global"), ("b", "global"), ("c", "global")])),
        ];
        let resolved = resolve(&answers).unwrap();

        assert_eq!(
            resolved.for_project("c-1:p-1").values,
            map(&[("a", "global"), ("b", "cluster"), ("c", "project")])
        );
        assert_eq!(
            resolved.for_project("c-1:p-2").values,
            map(&[("a", "global"), ("b", "cluster"), ("c", "cluster")])
        );
        assert_eq!(
            resolved.for_project("c-2:p-9").values,
            map(&[("a", "global"), ("b", "global"), ("c", "global")])
        );
    }

    #[test]
    fn test_project_without_cluster_answers_merges_global() {
        let answers = vec![
            Answer::global(map(&[("a", "1"), ("b", "1")])),
            Answer::for_project("c-1:p-1", map(&[("b", "2")])),
        ];
        let resolved = resolve(&answers).unwrap();
        assert_eq!(
            resolved.for_project("c-1:p-1").values,
            map(&[("a", "1"), ("b", "2")])
        );
    }

    #[test]
    fn test_no_answers_resolves_empty() {
        let resolved = resolve(&[]).unwrap();
        assert!(resolved.is_empty());
        assert_eq!(resolved.for_project("c-1:p-1"), ScopeAnswers::default());
    }

    #[test]
    fn test_set_string_values_follow_precedence() {
        let mut global = Answer::global(BTreeMap::new());
        global.values_set_string = map(&[("image.tag", "1.0"), ("name", "web")]);
        let mut cluster = Answer::for_cluster("c-1", BTreeMap::new());
        cluster.values_set_string = map(&[("image.tag", "1.1")]);

        let resolved = resolve(&[global, cluster]).unwrap();
        assert_eq!(
            resolved.for_project("c-1:p-1").values_set_string,
            map(&[("image.tag", "1.1"), ("name", "web")])
        );
    }

    #[test]
    fn test_malformed_project_scope_fails() {
        let answers = vec![Answer::for_project("p-1", map(&[("a", "1")]))];
        assert!(matches!(
            resolve(&answers),
            Err(ControllerError::InvalidProjectName(_))
        ));
    }
}
