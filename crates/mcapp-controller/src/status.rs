//! MCApp Status Reducer
//!
//! Derives per-target and aggregate state from the conditions the
//! deployment engine writes on each App, and persists it without touching
//! anything else on the MCApp.

use crate::error::{ControllerError, Result};
use crate::stores::Stores;
use mcapp_store::ConflictRetry;
use mcapp_types::{
    split_project_name, App, AppState, MultiClusterApp, ObjectKey, Resource, Target,
};
use std::collections::HashMap;

/// Reduced state of one MCApp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    /// State per target, keyed by project name
    pub targets: HashMap<String, AppState>,
    pub state: AppState,
}

impl StatusSummary {
    /// Whether `mcapp` already records this summary
    pub fn is_recorded(&self, mcapp: &MultiClusterApp) -> bool {
        mcapp.status.state == Some(self.state)
            && mcapp
                .spec
                .targets
                .iter()
                .all(|t| t.state == self.targets.get(&t.project_name).copied())
    }

    fn apply(&self, mcapp: &mut MultiClusterApp) {
        for target in &mut mcapp.spec.targets {
            target.state = self.targets.get(&target.project_name).copied();
        }
        mcapp.status.state = Some(self.state);
    }
}

fn target_state(app: Option<&App>) -> AppState {
    match app {
        Some(app) if app.is_installed() && app.is_deployed() => AppState::Active,
        Some(app) if app.is_installed() => AppState::Deploying,
        _ => AppState::Installing,
    }
}

/// Reduce `(target, app)` pairs to per-target and aggregate state
///
/// Any installing target makes the MCApp installing; otherwise any
/// deploying target makes it deploying; otherwise it is active.
pub fn reduce(mcapp_name: &str, targets: &[(Target, Option<App>)]) -> Result<StatusSummary> {
    let mut states = HashMap::with_capacity(targets.len());

    for (target, app) in targets {
        if let Some(app) = app {
            if app.mcapp_owner() != Some(mcapp_name) {
                return Err(ControllerError::ForeignApp {
                    app: app.key(),
                    expected: mcapp_name.to_string(),
                    found: app.mcapp_owner().map(str::to_string),
                });
            }
        }
        states.insert(target.project_name.clone(), target_state(app.as_ref()));
    }

    let state = if states.values().any(|s| *s == AppState::Installing) {
        AppState::Installing
    } else if states.values().any(|s| *s == AppState::Deploying) {
        AppState::Deploying
    } else {
        AppState::Active
    };

    Ok(StatusSummary {
        targets: states,
        state,
    })
}

/// Persists reduced status for MCApps
pub struct StatusWriter {
    stores: Stores,
    retry: ConflictRetry,
}

impl StatusWriter {
    pub fn new(stores: Stores, retry: ConflictRetry) -> Self {
        Self { stores, retry }
    }

    /// Recompute and store the status of `key`; returns whether a write happened
    #[tracing::instrument(skip(self, key), fields(mcapp = %key))]
    pub async fn sync(&self, key: &ObjectKey) -> Result<bool> {
        let mcapp = match self.stores.mcapps.get(&key.namespace, &key.name).await {
            Ok(mcapp) => mcapp,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if mcapp.is_deleting() {
            return Ok(false);
        }

        let mut pairs = Vec::with_capacity(mcapp.spec.targets.len());
        for target in &mcapp.spec.targets {
            let app = match &target.app_name {
                Some(app_name) => {
                    let project = split_project_name(&target.project_name)?;
                    match self.stores.apps.get(project.namespace, app_name).await {
                        Ok(app) => Some(app),
                        Err(e) if e.is_not_found() => None,
                        Err(e) => return Err(e.into()),
                    }
                }
                None => None,
            };
            pairs.push((target.clone(), app));
        }

        let summary = reduce(mcapp.name(), &pairs)?;
        if summary.is_recorded(&mcapp) {
            return Ok(false);
        }

        let mut desired = mcapp;
        summary.apply(&mut desired);
        self.retry
            .update(&*self.stores.mcapps, desired, |fresh: &mut MultiClusterApp| {
                summary.apply(fresh)
            })
            .await?;
        tracing::debug!(state = %summary.state, "MultiClusterApp status updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcapp_types::{ConditionType, ObjectMeta, MCAPP_ID_LABEL};

    fn app(owner: &str, installed: bool, deployed: bool) -> App {
        let mut app = App {
            metadata: ObjectMeta::named("p-1", "web-p-1").with_label(MCAPP_ID_LABEL, owner),
            ..Default::default()
        };
        if installed {
            app.status.conditions.mark_true(ConditionType::Installed);
        }
        if deployed {
            app.status.conditions.mark_true(ConditionType::Deployed);
        }
        app
    }

    fn target(project: &str) -> Target {
        Target::new(project)
    }

    #[test]
    fn test_missing_app_is_installing() {
        let summary = reduce(
            "web",
            &[
                (target("c-1:p-1"), Some(app("web", true, true))),
                (target("c-1:p-2"), None),
            ],
        )
        .unwrap();
        assert_eq!(summary.state, AppState::Installing);
        assert_eq!(summary.targets["c-1:p-1"], AppState::Active);
        assert_eq!(summary.targets["c-1:p-2"], AppState::Installing);
    }

    #[test]
    fn test_installed_not_deployed_is_deploying() {
        let summary = reduce(
            "web",
            &[
                (target("c-1:p-1"), Some(app("web", true, true))),
                (target("c-1:p-2"), Some(app("web", true, false))),
            ],
        )
        .unwrap();
        assert_eq!(summary.state, AppState::Deploying);
    }

    #[test]
    fn test_all_ready_is_active() {
        let summary = reduce(
            "web",
            &[(target("c-1:p-1"), Some(app("web", true, true)))],
        )
        .unwrap();
        assert_eq!(summary.state, AppState::Active);
    }

    #[test]
    fn test_foreign_app_is_rejected() {
        let err = reduce("web", &[(target("c-1:p-1"), Some(app("db", true, true)))])
            .unwrap_err();
        assert!(matches!(err, ControllerError::ForeignApp { .. }));
    }
}
