//! Access Propagator
//!
//! Maintains one Role and one RoleBinding per access tier for a shared
//! resource. Objects are derived entirely from the request, so they can be
//! rebuilt from scratch; an ensure that finds them already correct writes
//! nothing.

use crate::error::{ControllerError, Result};
use mcapp_store::{ConflictRetry, ObjectStore, StoreError};
use mcapp_types::{
    AccessTier, Member, ObjectMeta, OwnerReference, PolicyRule, Role, RoleBinding, RoleRef,
    Subject, ACCESS_RESOURCE_NAME_LABEL, ACCESS_RESOURCE_TYPE_LABEL, ACCESS_TIER_LABEL,
    API_GROUP,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What to grant access on, and to whom
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    /// Plural resource kind, e.g. `multiclusterapps`
    pub resource_type: &'static str,
    pub resource_name: &'a str,
    pub owner: OwnerReference,
    pub creator_id: &'a str,
    pub members: &'a [Member],
}

impl AccessRequest<'_> {
    /// Sorted, de-duplicated subjects per tier; the creator is always an owner
    pub fn subjects(&self) -> [(AccessTier, Vec<Subject>); 3] {
        let mut owners = BTreeSet::new();
        let mut members = BTreeSet::new();
        let mut readers = BTreeSet::new();
        owners.insert(Subject::user(self.creator_id));

        for member in self.members {
            let Some(subject) = member.subject() else {
                continue;
            };
            match member.access_type {
                AccessTier::Owner => owners.insert(subject),
                AccessTier::Member => members.insert(subject),
                AccessTier::ReadOnly => readers.insert(subject),
            };
        }

        [
            (AccessTier::Owner, owners.into_iter().collect()),
            (AccessTier::Member, members.into_iter().collect()),
            (AccessTier::ReadOnly, readers.into_iter().collect()),
        ]
    }

    /// Name shared by the tier's Role and RoleBinding
    pub fn object_name(&self, tier: AccessTier) -> String {
        format!("{}-{}", self.resource_name, tier)
    }

    fn metadata(&self, namespace: &str, tier: AccessTier) -> ObjectMeta {
        let mut metadata = ObjectMeta::named(namespace, self.object_name(tier))
            .with_label(ACCESS_RESOURCE_TYPE_LABEL, self.resource_type)
            .with_label(ACCESS_RESOURCE_NAME_LABEL, self.resource_name)
            .with_label(ACCESS_TIER_LABEL, tier.as_str());
        metadata.owner_references = vec![self.owner.clone()];
        metadata
    }

    fn role(&self, namespace: &str, tier: AccessTier) -> Role {
        Role {
            metadata: self.metadata(namespace, tier),
            rules: vec![PolicyRule {
                api_groups: vec![API_GROUP.to_string()],
                resources: vec![self.resource_type.to_string()],
                resource_names: vec![self.resource_name.to_string()],
                verbs: tier.verbs().iter().map(|v| v.to_string()).collect(),
            }],
        }
    }

    fn binding(&self, namespace: &str, tier: AccessTier, subjects: Vec<Subject>) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(namespace, tier),
            role_ref: RoleRef {
                kind: "Role".to_string(),
                name: self.object_name(tier),
            },
            subjects,
        }
    }
}

/// Creates and repairs tiered access objects
pub struct AccessPropagator {
    roles: Arc<dyn ObjectStore<Role>>,
    bindings: Arc<dyn ObjectStore<RoleBinding>>,
    namespace: String,
    retry: ConflictRetry,
}

impl AccessPropagator {
    pub fn new(
        roles: Arc<dyn ObjectStore<Role>>,
        bindings: Arc<dyn ObjectStore<RoleBinding>>,
        namespace: impl Into<String>,
        retry: ConflictRetry,
    ) -> Self {
        Self {
            roles,
            bindings,
            namespace: namespace.into(),
            retry,
        }
    }

    /// Ensure every applicable tier matches `request`
    ///
    /// The owner tier is always ensured; member and read-only tiers only when
    /// they have subjects. Tiers are independent: a failing tier is reported
    /// after the others have been applied.
    #[tracing::instrument(skip(self, request), fields(resource = %request.resource_name, kind = request.resource_type))]
    pub async fn ensure(&self, request: &AccessRequest<'_>) -> Result<()> {
        let mut failures = Vec::new();

        for (tier, subjects) in request.subjects() {
            if tier != AccessTier::Owner && subjects.is_empty() {
                continue;
            }
            if let Err(e) = self.ensure_tier(request, tier, subjects).await {
                tracing::warn!(tier = %tier, error = %e, "Failed to ensure access tier");
                failures.push((tier, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::Access(failures))
        }
    }

    async fn ensure_tier(
        &self,
        request: &AccessRequest<'_>,
        tier: AccessTier,
        subjects: Vec<Subject>,
    ) -> std::result::Result<(), StoreError> {
        let role = request.role(&self.namespace, tier);
        ensure_object(
            &*self.roles,
            self.retry,
            role,
            |live, desired| live.rules == desired.rules,
            |live, desired| live.rules = desired.rules.clone(),
        )
        .await?;

        let binding = request.binding(&self.namespace, tier, subjects);
        ensure_object(
            &*self.bindings,
            self.retry,
            binding,
            |live, desired| live.role_ref == desired.role_ref && live.subjects == desired.subjects,
            |live, desired| {
                live.role_ref = desired.role_ref.clone();
                live.subjects = desired.subjects.clone();
            },
        )
        .await
    }
}

/// Create `desired`, or bring the live copy in line with it
///
/// Ownership labels and owner references are reconciled along with the
/// kind-specific fields compared by `matches` and copied by `apply`.
async fn ensure_object<K, S, M, A>(
    store: &S,
    retry: ConflictRetry,
    desired: K,
    matches: M,
    apply: A,
) -> std::result::Result<(), StoreError>
where
    K: mcapp_types::Resource + PartialEq,
    S: ObjectStore<K> + ?Sized,
    M: Fn(&K, &K) -> bool,
    A: Fn(&mut K, &K) + Send + Sync,
{
    let key = desired.key();
    let live = match store.get(&key.namespace, &key.name).await {
        Ok(live) => live,
        Err(e) if e.is_not_found() => {
            return match store.create(desired).await {
                Ok(_) => {
                    tracing::debug!(kind = K::KIND, key = %key, "Access object created");
                    Ok(())
                }
                // Created concurrently; the next sync compares it
                Err(e) if e.is_already_exists() => Ok(()),
                Err(e) => Err(e),
            };
        }
        Err(e) => return Err(e),
    };

    let owned = |live: &K| {
        let (meta, want) = (live.meta(), desired.meta());
        want.labels.iter().all(|(k, v)| meta.labels.get(k) == Some(v))
            && meta.owner_references == want.owner_references
    };
    if matches(&live, &desired) && owned(&live) {
        return Ok(());
    }

    let merge = |object: &mut K| {
        apply(object, &desired);
        let want = desired.meta();
        let meta = object.meta_mut();
        meta.labels
            .extend(want.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        meta.owner_references = want.owner_references.clone();
    };
    let mut updated = live;
    merge(&mut updated);
    retry.update(store, updated, merge).await?;
    tracing::debug!(kind = K::KIND, key = %key, "Access object updated");
    Ok(())
}
