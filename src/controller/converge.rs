//! Get-or-create-or-update for the objects the reconcilers derive
//!
//! [`converge`] is the single write path of both reconcilers. It always re-reads
//! the live object, compares only the fields the operator manages, and writes
//! exactly those fields back when they drifted. Fields owned by other actors
//! (annotations, finalizers, status, extra labels on roles) are left alone.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use super::KubeClient;
use crate::Error;

/// Label the API server stamps on every namespace with the namespace's own name
pub const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

/// How a derived object relates to the resource it was derived from
#[derive(Clone, Debug, PartialEq)]
pub enum Ownership {
    /// Garbage-collected with its owner through this owner reference
    Owned(OwnerReference),
    /// Cannot carry an owner reference (e.g. a cluster-scoped namespace derived
    /// from a namespaced Space); cleanup is driven by a finalizer instead
    CrossScope,
}

/// What [`converge`] did to the live object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergeOutcome {
    /// The object did not exist and was created
    Created,
    /// The managed fields differed and were overwritten
    Updated,
    /// The managed fields already matched
    Unchanged,
}

/// An object kind [`converge`] knows how to read, compare and write
#[async_trait]
pub trait Convergent: Resource<DynamicType = ()> + Clone + Send + Sync + Sized {
    /// Read the live counterpart of this (desired) object
    async fn fetch_live(&self, kube: &dyn KubeClient) -> Result<Option<Self>, Error>;

    /// Create this object
    async fn create(&self, kube: &dyn KubeClient) -> Result<Self, Error>;

    /// Persist this (modified live) object
    async fn update(&self, kube: &dyn KubeClient) -> Result<Self, Error>;

    /// Returns true if `live` already carries this object's managed fields
    fn managed_fields_match(&self, live: &Self) -> bool;

    /// Overwrite the managed fields of `live` with this object's
    fn apply_managed_fields(&self, live: &mut Self);
}

/// Make the live object match `desired` and report what changed
///
/// Owner references are only injected on create. An existing object with drifted
/// managed fields is updated in place, keeping its resourceVersion so concurrent
/// writers are detected by the API server.
pub async fn converge<K: Convergent>(
    kube: &dyn KubeClient,
    desired: K,
    ownership: &Ownership,
) -> Result<ConvergeOutcome, Error> {
    let kind = K::kind(&());
    let name = desired.name_any();

    let live = desired.fetch_live(kube).await?;
    match live {
        None => {
            let mut obj = desired;
            if let Ownership::Owned(owner) = ownership {
                obj.meta_mut().owner_references = Some(vec![owner.clone()]);
            }
            obj.create(kube).await?;
            info!(%kind, %name, namespace = ?obj.namespace(), "created");
            Ok(ConvergeOutcome::Created)
        }
        Some(live) if desired.managed_fields_match(&live) => {
            debug!(%kind, %name, "up to date");
            Ok(ConvergeOutcome::Unchanged)
        }
        Some(mut live) => {
            desired.apply_managed_fields(&mut live);
            live.update(kube).await?;
            info!(%kind, %name, namespace = ?live.namespace(), "updated");
            Ok(ConvergeOutcome::Updated)
        }
    }
}

fn require_namespace<K: Resource<DynamicType = ()>>(obj: &K) -> Result<String, Error> {
    obj.namespace().ok_or_else(|| {
        Error::internal(format!(
            "{} {} has no namespace",
            K::kind(&()),
            obj.name_any()
        ))
    })
}

/// Namespace labels as compared by [`converge`], without the server-managed name label
fn managed_labels(ns: &Namespace) -> BTreeMap<String, String> {
    let mut labels = ns.metadata.labels.clone().unwrap_or_default();
    labels.remove(NAMESPACE_NAME_LABEL);
    labels
}

#[async_trait]
impl Convergent for Namespace {
    async fn fetch_live(&self, kube: &dyn KubeClient) -> Result<Option<Self>, Error> {
        kube.get_namespace(&self.name_any()).await
    }

    async fn create(&self, kube: &dyn KubeClient) -> Result<Self, Error> {
        kube.create_namespace(self).await
    }

    async fn update(&self, kube: &dyn KubeClient) -> Result<Self, Error> {
        kube.replace_namespace(self).await
    }

    fn managed_fields_match(&self, live: &Self) -> bool {
        managed_labels(self) == managed_labels(live)
    }

    fn apply_managed_fields(&self, live: &mut Self) {
        let mut labels = managed_labels(self);
        if let Some(name) = live.labels().get(NAMESPACE_NAME_LABEL) {
            labels.insert(NAMESPACE_NAME_LABEL.to_string(), name.clone());
        }
        live.metadata.labels = Some(labels);
    }
}

#[async_trait]
impl Convergent for Role {
    async fn fetch_live(&self, kube: &dyn KubeClient) -> Result<Option<Self>, Error> {
        kube.get_role(&require_namespace(self)?, &self.name_any())
            .await
    }

    async fn create(&self, kube: &dyn KubeClient) -> Result<Self, Error> {
        kube.create_role(self).await
    }

    async fn update(&self, kube: &dyn KubeClient) -> Result<Self, Error> {
        kube.replace_role(self).await
    }

    fn managed_fields_match(&self, live: &Self) -> bool {
        self.rules.as_deref().unwrap_or_default() == live.rules.as_deref().unwrap_or_default()
    }

    fn apply_managed_fields(&self, live: &mut Self) {
        live.rules = self.rules.clone();
    }
}

/// Returns true if every label of `desired` is present with the same value in `live`
fn labels_present(desired: &RoleBinding, live: &RoleBinding) -> bool {
    let live_labels = live.labels();
    desired
        .labels()
        .iter()
        .all(|(k, v)| live_labels.get(k) == Some(v))
}

#[async_trait]
impl Convergent for RoleBinding {
    async fn fetch_live(&self, kube: &dyn KubeClient) -> Result<Option<Self>, Error> {
        kube.get_role_binding(&require_namespace(self)?, &self.name_any())
            .await
    }

    async fn create(&self, kube: &dyn KubeClient) -> Result<Self, Error> {
        kube.create_role_binding(self).await
    }

    async fn update(&self, kube: &dyn KubeClient) -> Result<Self, Error> {
        kube.replace_role_binding(self).await
    }

    fn managed_fields_match(&self, live: &Self) -> bool {
        self.role_ref == live.role_ref
            && self.subjects.as_deref().unwrap_or_default()
                == live.subjects.as_deref().unwrap_or_default()
            && labels_present(self, live)
    }

    fn apply_managed_fields(&self, live: &mut Self) {
        live.role_ref = self.role_ref.clone();
        live.subjects = self.subjects.clone();
        // Labels added by other actors are kept
        let desired_labels = self.labels().clone();
        live.labels_mut().extend(desired_labels);
    }
}
