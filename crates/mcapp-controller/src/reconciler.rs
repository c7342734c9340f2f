//! MCApp Reconciler
//!
//! One sync per MCApp key. A sync resolves answers, creates missing target
//! Apps, stages a bounded batch of out-of-date Apps while a rollout is due,
//! records rollout progress in the Installed/Deployed conditions and
//! snapshots a revision once every target has converged.
//!
//! Every write to an object another party may also write goes through
//! [`ConflictRetry`], merging only the fields this reconciler owns.

use crate::access::{AccessPropagator, AccessRequest};
use crate::answers::{self, ResolvedAnswers, ScopeAnswers};
use crate::error::{ControllerError, Result};
use crate::rollout::RolloutScheduler;
use crate::stores::Stores;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use mcapp_store::{ConflictRetry, LabelSelector, StoreError};
use mcapp_types::{
    split_project_name, App, AppSpec, ConditionType, MultiClusterApp, MultiClusterAppRevision,
    ObjectKey, ObjectMeta, OwnerReference, Resource, API_VERSION, CREATOR_ID_ANNOTATION,
    MCAPP_ID_LABEL,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Deterministic name of the App deployed for `mcapp` into `project_namespace`
pub fn app_name(mcapp: &str, project_namespace: &str) -> String {
    format!("{}-{}", mcapp, project_namespace)
}

/// Whether a rollout started less than one interval ago
///
/// Only an Installed condition that is Unknown with the upgrading message
/// throttles; its timestamp is refreshed whenever a batch is applied.
pub fn is_throttled(mcapp: &MultiClusterApp, now: DateTime<Utc>) -> bool {
    let Some(since) = mcapp
        .status
        .conditions
        .upgrading_since(ConditionType::Installed)
    else {
        return false;
    };
    let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
    elapsed < mcapp.rolling_interval()
}

/// Number of targets that may be created or updated in this sync
pub fn batch_size(mcapp: &MultiClusterApp, to_update: bool) -> usize {
    match mcapp.rolling_update() {
        Some(rolling) if to_update && rolling.interval > 0 => rolling.batch_size,
        _ => mcapp.spec.targets.len(),
    }
}

fn app_matches(app: &App, external_id: &str, desired: &ScopeAnswers) -> bool {
    app.spec.external_id == external_id
        && app.spec.answers == desired.values
        && app.spec.answers_set_string == desired.values_set_string
}

fn apply_answers(app: &mut App, external_id: &str, desired: &ScopeAnswers) {
    app.spec.external_id = external_id.to_string();
    app.spec.answers = desired.values.clone();
    app.spec.answers_set_string = desired.values_set_string.clone();
}

fn mark_upgrading(mcapp: &mut MultiClusterApp, now: DateTime<Utc>) {
    let conditions = &mut mcapp.status.conditions;
    conditions.mark_upgrading(ConditionType::Installed, now);
    if conditions.is_unknown(ConditionType::Deployed) {
        conditions.mark_true(ConditionType::Deployed);
    }
}

fn mark_rolled_out(mcapp: &mut MultiClusterApp, revision: &str) {
    mcapp.status.revision_name = Some(revision.to_string());
    mcapp.status.conditions.mark_true(ConditionType::Installed);
    mcapp.status.conditions.mark_true(ConditionType::Deployed);
}

/// Outcome of the per-target pass
#[derive(Debug, Default)]
struct TargetPass {
    /// App names to record, keyed by project name
    assigned: HashMap<String, String>,
    /// Out-of-date Apps staged for this batch, with their project name
    staged: Vec<(App, String)>,
    /// Targets whose App exists and matches the desired state
    converged: usize,
    /// Every converged App reports Installed and Deployed
    all_ready: bool,
    created: usize,
    /// Batch budget left after creations
    remaining: usize,
}

/// Reconciles MultiClusterApps against their target Apps
pub struct Reconciler {
    stores: Stores,
    rollouts: Arc<RolloutScheduler>,
    access: AccessPropagator,
    retry: ConflictRetry,
}

impl Reconciler {
    pub fn new(
        stores: Stores,
        rollouts: Arc<RolloutScheduler>,
        global_namespace: impl Into<String>,
        retry: ConflictRetry,
    ) -> Self {
        let access = AccessPropagator::new(
            stores.roles.clone(),
            stores.role_bindings.clone(),
            global_namespace,
            retry,
        );
        Self {
            stores,
            rollouts,
            access,
            retry,
        }
    }

    pub fn rollouts(&self) -> &Arc<RolloutScheduler> {
        &self.rollouts
    }

    /// Reconcile the MCApp stored under `key`
    #[tracing::instrument(skip(self, key), fields(mcapp = %key))]
    pub async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let mcapp = match self.stores.mcapps.get(&key.namespace, &key.name).await {
            Ok(mcapp) => Some(mcapp),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        match mcapp {
            Some(mcapp) if !mcapp.is_deleting() => self.reconcile(mcapp).await,
            _ => self.delete_apps(key).await,
        }
    }

    async fn reconcile(&self, mcapp: MultiClusterApp) -> Result<()> {
        let creator = mcapp
            .creator_id()
            .ok_or_else(|| ControllerError::MissingCreator(mcapp.metadata.name.clone()))?
            .to_string();

        let access = self.ensure_access(&mcapp, &creator).await;
        let rollout = self.rollout(mcapp, &creator).await;
        rollout.and(access)
    }

    async fn rollout(&self, mcapp: MultiClusterApp, creator: &str) -> Result<()> {
        let key = mcapp.key();
        let answers = answers::resolve(&mcapp.spec.answers)?;
        let external_id = self.external_id(&mcapp).await?;
        self.delete_orphans(&mcapp).await?;

        let changed = self.is_changed(&mcapp).await?;
        let to_update = changed && !is_throttled(&mcapp, Utc::now());
        let batch = batch_size(&mcapp, to_update);
        tracing::debug!(changed, to_update, batch, "Evaluated rollout");

        let pass = self
            .visit_targets(&mcapp, &answers, &external_id, creator, batch, to_update)
            .await?;
        let mut mcapp = self.record_app_names(mcapp, &pass.assigned).await?;

        if !changed {
            self.rollouts.cancel(&key).await;
            return Ok(());
        }

        let upgrading = mcapp
            .status
            .conditions
            .is_upgrading(ConditionType::Installed);
        let converged = pass.converged == mcapp.spec.targets.len() && pass.all_ready;
        if converged && (upgrading || mcapp.status.revision_name.is_none()) {
            self.rollouts.cancel(&key).await;
            return self.complete(mcapp).await;
        }

        let interval = mcapp.rolling_interval();
        if interval.is_zero() {
            self.rollouts.cancel(&key).await;
        } else {
            self.rollouts.ensure(&key, interval).await;
        }

        if !to_update {
            return Ok(());
        }

        let mut updated = 0;
        for (app, project_name) in pass.staged.into_iter().take(pass.remaining) {
            let desired = answers.for_project(&project_name);
            self.update_app(app, &external_id, &desired).await?;
            updated += 1;
        }

        if pass.created > 0 || updated > 0 || !upgrading {
            mcapp = self.set_upgrading(mcapp).await?;
            tracing::info!(
                created = pass.created,
                updated,
                revision = ?mcapp.status.revision_name,
                "Rollout batch applied"
            );
        }
        Ok(())
    }

    /// Single pass over targets in list order
    async fn visit_targets(
        &self,
        mcapp: &MultiClusterApp,
        answers: &ResolvedAnswers,
        external_id: &str,
        creator: &str,
        batch: usize,
        to_update: bool,
    ) -> Result<TargetPass> {
        let mcapp_name = mcapp.metadata.name.as_str();
        let mut pass = TargetPass {
            all_ready: true,
            ..Default::default()
        };
        let mut create_budget = batch;
        let mut update_budget = batch;
        let mut staging = to_update;

        for target in &mcapp.spec.targets {
            let project = split_project_name(&target.project_name)?;
            let desired = answers.for_project(&target.project_name);

            if let Some(existing) = &target.app_name {
                match self.stores.apps.get(project.namespace, existing).await {
                    Ok(app) => {
                        if app.mcapp_owner() != Some(mcapp_name) {
                            return Err(ControllerError::ForeignApp {
                                app: app.key(),
                                expected: mcapp_name.to_string(),
                                found: app.mcapp_owner().map(str::to_string),
                            });
                        }
                        if app_matches(&app, external_id, &desired) {
                            pass.converged += 1;
                            if !app.is_ready() {
                                pass.all_ready = false;
                                if staging {
                                    tracing::debug!(
                                        app = %app.key(),
                                        "Waiting for app to become healthy before next batch"
                                    );
                                    staging = false;
                                    pass.staged.clear();
                                }
                            }
                        } else if staging && update_budget > 0 {
                            pass.staged.push((app, target.project_name.clone()));
                            update_budget -= 1;
                        }
                        continue;
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(
                            app = %existing,
                            project = %target.project_name,
                            "Target app is missing, recreating"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if create_budget == 0 {
                continue;
            }
            let (name, created) = self
                .create_app(mcapp, &target.project_name, project.namespace, creator, external_id, &desired)
                .await?;
            create_budget -= 1;
            pass.converged += 1;
            pass.all_ready = false;
            if created {
                pass.created += 1;
            }
            if target.app_name.as_deref() != Some(name.as_str()) {
                pass.assigned.insert(target.project_name.clone(), name);
            }
        }

        pass.remaining = create_budget;
        Ok(pass)
    }

    /// Create the App for one target; an existing App with the same name is adopted
    async fn create_app(
        &self,
        mcapp: &MultiClusterApp,
        project_name: &str,
        namespace: &str,
        creator: &str,
        external_id: &str,
        desired: &ScopeAnswers,
    ) -> Result<(String, bool)> {
        let name = app_name(&mcapp.metadata.name, namespace);
        let app = App {
            metadata: ObjectMeta::named(namespace, name.as_str())
                .with_label(MCAPP_ID_LABEL, mcapp.metadata.name.as_str())
                .with_annotation(CREATOR_ID_ANNOTATION, creator),
            spec: AppSpec {
                project_name: project_name.to_string(),
                target_namespace: name.clone(),
                external_id: external_id.to_string(),
                multi_cluster_app_name: Some(mcapp.metadata.name.clone()),
                answers: desired.values.clone(),
                answers_set_string: desired.values_set_string.clone(),
                wait: mcapp.spec.wait,
                timeout: mcapp.spec.timeout,
            },
            ..Default::default()
        };

        match self.stores.apps.create(app).await {
            Ok(created) => {
                tracing::info!(app = %created.key(), "App created");
                Ok((name, true))
            }
            Err(e) if e.is_already_exists() => {
                let existing = self.stores.apps.get(namespace, &name).await?;
                if existing.mcapp_owner() != Some(mcapp.metadata.name.as_str()) {
                    return Err(ControllerError::ForeignApp {
                        app: existing.key(),
                        expected: mcapp.metadata.name.clone(),
                        found: existing.mcapp_owner().map(str::to_string),
                    });
                }
                Ok((name, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_app(&self, app: App, external_id: &str, desired: &ScopeAnswers) -> Result<()> {
        let key = app.key();
        let mut updated = app;
        apply_answers(&mut updated, external_id, desired);
        self.retry
            .update(&*self.stores.apps, updated, |fresh: &mut App| {
                apply_answers(fresh, external_id, desired)
            })
            .await?;
        tracing::info!(app = %key, "App updated for rollout");
        Ok(())
    }

    async fn record_app_names(
        &self,
        mcapp: MultiClusterApp,
        assigned: &HashMap<String, String>,
    ) -> Result<MultiClusterApp> {
        if assigned.is_empty() {
            return Ok(mcapp);
        }
        let merge = |object: &mut MultiClusterApp| {
            for target in &mut object.spec.targets {
                if let Some(name) = assigned.get(&target.project_name) {
                    target.app_name = Some(name.clone());
                }
            }
        };
        let mut desired = mcapp;
        merge(&mut desired);
        Ok(self.retry.update(&*self.stores.mcapps, desired, merge).await?)
    }

    async fn set_upgrading(&self, mcapp: MultiClusterApp) -> Result<MultiClusterApp> {
        let now = Utc::now();
        let mut desired = mcapp;
        mark_upgrading(&mut desired, now);
        Ok(self
            .retry
            .update(&*self.stores.mcapps, desired, |fresh: &mut MultiClusterApp| {
                mark_upgrading(fresh, now)
            })
            .await?)
    }

    /// Snapshot a revision and mark the rollout done
    ///
    /// A matching revision already recorded on the latest copy is reused.
    async fn complete(&self, mcapp: MultiClusterApp) -> Result<()> {
        let key = mcapp.key();
        let latest = self.stores.mcapps.get(&key.namespace, &key.name).await?;
        let recorded = match &latest.status.revision_name {
            Some(current) => match self.stores.revisions.get(&key.namespace, current).await {
                Ok(revision) if revision.matches(&mcapp) => Some(current.clone()),
                Ok(_) => None,
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let revision_name = match recorded {
            Some(name) => name,
            None => {
                self.stores
                    .revisions
                    .create(MultiClusterAppRevision::snapshot(&mcapp))
                    .await?
                    .metadata
                    .name
            }
        };

        let mut desired = latest.clone();
        mark_rolled_out(&mut desired, &revision_name);
        if desired.status == latest.status {
            return Ok(());
        }
        self.retry
            .update(&*self.stores.mcapps, desired, |fresh: &mut MultiClusterApp| {
                mark_rolled_out(fresh, &revision_name)
            })
            .await?;
        tracing::info!(revision = %revision_name, "Rollout complete");
        Ok(())
    }

    /// Whether the MCApp differs from its last rolled-out revision
    async fn is_changed(&self, mcapp: &MultiClusterApp) -> Result<bool> {
        let Some(revision_name) = &mcapp.status.revision_name else {
            return Ok(true);
        };
        match self
            .stores
            .revisions
            .get(&mcapp.metadata.namespace, revision_name)
            .await
        {
            Ok(revision) => Ok(!revision.matches(mcapp)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(revision = %revision_name, "Recorded revision is missing");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Catalog identifier of the MCApp's template version
    async fn external_id(&self, mcapp: &MultiClusterApp) -> Result<String> {
        let reference = mcapp.spec.template_version_name.as_str();
        let invalid = || ControllerError::InvalidTemplateVersion(reference.to_string());
        let (namespace, name) = reference
            .split_once(':')
            .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
            .ok_or_else(invalid)?;

        match self.stores.template_versions.get(namespace, name).await {
            Ok(version) => Ok(version.external_id),
            Err(e) if e.is_not_found() => Err(invalid()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete labelled Apps living outside every current target project
    async fn delete_orphans(&self, mcapp: &MultiClusterApp) -> Result<()> {
        let namespaces = mcapp
            .spec
            .targets
            .iter()
            .map(|t| split_project_name(&t.project_name).map(|p| p.namespace))
            .collect::<std::result::Result<HashSet<_>, _>>()?;

        let orphans: Vec<App> = self
            .owned_apps(&mcapp.metadata.name)
            .await?
            .into_iter()
            .filter(|app| !namespaces.contains(app.metadata.namespace.as_str()))
            .collect();
        if orphans.is_empty() {
            return Ok(());
        }

        tracing::info!(count = orphans.len(), "Deleting apps of removed targets");
        self.delete_all(&orphans).await
    }

    /// Deletion path: stop the rollout timer and remove every owned App
    async fn delete_apps(&self, key: &ObjectKey) -> Result<()> {
        self.rollouts.cancel(key).await;
        let apps = self.owned_apps(&key.name).await?;
        if !apps.is_empty() {
            tracing::info!(count = apps.len(), "Deleting apps of removed MultiClusterApp");
        }
        self.delete_all(&apps).await
    }

    async fn owned_apps(&self, mcapp_name: &str) -> Result<Vec<App>> {
        let selector = LabelSelector::eq(MCAPP_ID_LABEL, mcapp_name);
        Ok(self.stores.apps.list(None, &selector).await?)
    }

    /// Delete concurrently; not-found counts as deleted, other failures are joined
    async fn delete_all(&self, apps: &[App]) -> Result<()> {
        let results = join_all(apps.iter().map(|app| {
            let store = &self.stores.apps;
            async move {
                store
                    .delete(&app.metadata.namespace, &app.metadata.name)
                    .await
            }
        }))
        .await;

        let failures: Vec<StoreError> = results
            .into_iter()
            .filter_map(|r| r.err())
            .filter(|e| !e.is_not_found())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::Deletion(failures))
        }
    }

    /// Access objects for the MCApp and for its current revision
    async fn ensure_access(&self, mcapp: &MultiClusterApp, creator: &str) -> Result<()> {
        let request = AccessRequest {
            resource_type: MultiClusterApp::PLURAL,
            resource_name: &mcapp.metadata.name,
            owner: mcapp.owner_reference(),
            creator_id: creator,
            members: &mcapp.spec.members,
        };
        let mcapp_access = self.access.ensure(&request).await;

        let Some(revision_name) = &mcapp.status.revision_name else {
            return mcapp_access;
        };
        let revision = match self
            .stores
            .revisions
            .get(&mcapp.metadata.namespace, revision_name)
            .await
        {
            Ok(revision) => revision,
            Err(e) if e.is_not_found() => return mcapp_access,
            Err(e) => return mcapp_access.and(Err(e.into())),
        };
        let request = AccessRequest {
            resource_type: MultiClusterAppRevision::PLURAL,
            resource_name: &revision.metadata.name,
            owner: OwnerReference {
                api_version: API_VERSION.to_string(),
                kind: MultiClusterAppRevision::KIND.to_string(),
                name: revision.metadata.name.clone(),
                uid: revision.metadata.uid,
            },
            creator_id: creator,
            members: &mcapp.spec.members,
        };
        let revision_access = self.access.ensure(&request).await;
        mcapp_access.and(revision_access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcapp_types::{MultiClusterAppSpec, RollingUpdate, Target, UpgradeStrategy};

    fn mcapp(batch_size: usize, interval: u64) -> MultiClusterApp {
        MultiClusterApp::new(
            "web",
            MultiClusterAppSpec {
                template_version_name: "cattle-global-data:nginx-1.0.0".into(),
                targets: vec![
                    Target::new("c-1:p-1"),
                    Target::new("c-1:p-2"),
                    Target::new("c-2:p-3"),
                ],
                upgrade_strategy: UpgradeStrategy {
                    rolling_update: Some(RollingUpdate {
                        batch_size,
                        interval,
                    }),
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_app_name_is_deterministic() {
        assert_eq!(app_name("web", "p-1"), "web-p-1");
    }

    #[test]
    fn test_batch_narrowed_only_for_active_interval_rollout() {
        assert_eq!(batch_size(&mcapp(2, 60), true), 2);
        assert_eq!(batch_size(&mcapp(2, 60), false), 3);
        assert_eq!(batch_size(&mcapp(2, 0), true), 3);

        let mut plain = mcapp(2, 60);
        plain.spec.upgrade_strategy.rolling_update = None;
        assert_eq!(batch_size(&plain, true), 3);
    }

    #[test]
    fn test_throttle_window() {
        let now = Utc::now();
        let mut app = mcapp(1, 60);
        assert!(!is_throttled(&app, now));

        app.status
            .conditions
            .mark_upgrading(ConditionType::Installed, now - chrono::Duration::seconds(30));
        assert!(is_throttled(&app, now));

        app.status
            .conditions
            .mark_upgrading(ConditionType::Installed, now - chrono::Duration::seconds(61));
        assert!(!is_throttled(&app, now));
    }

    #[test]
    fn test_upgrading_flips_deployed_unknown() {
        let now = Utc::now();
        let mut app = mcapp(1, 60);
        app.status
            .conditions
            .mark_upgrading(ConditionType::Deployed, now);

        mark_upgrading(&mut app, now);
        assert!(app.status.conditions.is_upgrading(ConditionType::Installed));
        assert!(app.status.conditions.is_true(ConditionType::Deployed));
    }

    #[test]
    fn test_rolled_out_sets_both_true() {
        let mut app = mcapp(1, 60);
        mark_upgrading(&mut app, Utc::now());
        mark_rolled_out(&mut app, "mcapprevision-abcde");

        assert_eq!(
            app.status.revision_name.as_deref(),
            Some("mcapprevision-abcde")
        );
        assert!(app.status.conditions.is_true(ConditionType::Installed));
        assert!(app.status.conditions.is_true(ConditionType::Deployed));
        assert_eq!(app.status.conditions.message(ConditionType::Installed), None);
    }
}
