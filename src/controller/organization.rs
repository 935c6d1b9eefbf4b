//! Organization reconciler
//!
//! An Organization gets a shared namespace for its Spaces plus two Roles scoping
//! access to Space resources in it, each bound to the Organization's groups.
//! Everything carries a controller owner reference, so deleting the
//! Organization cascades through garbage collection.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, Subject};
use kube::core::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument};

use super::converge::{converge, Ownership};
use super::rbac::{role_ref, subjects, union};
use super::{reconcile_key, Context};
use crate::crd::{Organization, OrganizationSpec};
use crate::labels::spaces_namespace_labels;
use crate::naming::spaces_namespace;
use crate::{Error, API_GROUP};

/// Resource the scope roles grant access to
const SPACES_RESOURCE: &str = "spaces";

/// The two Roles an Organization installs in its spaces namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeRole {
    /// Read-only access to Spaces
    Reader,
    /// Full management of Spaces
    Admin,
}

impl ScopeRole {
    /// Both roles, in convergence order
    pub const ALL: [ScopeRole; 2] = [ScopeRole::Reader, ScopeRole::Admin];

    /// Name of the Role and of its RoleBinding
    pub fn name(self) -> &'static str {
        match self {
            ScopeRole::Reader => "scope-reader",
            ScopeRole::Admin => "scope-admin",
        }
    }

    /// Verbs granted on Spaces
    pub fn verbs(self) -> &'static [&'static str] {
        match self {
            ScopeRole::Reader => &["get", "list", "watch"],
            ScopeRole::Admin => &[
                "get", "list", "watch", "create", "update", "patch", "delete",
            ],
        }
    }

    /// The Role object in `namespace`
    pub fn role(self, namespace: &str) -> Role {
        Role {
            metadata: ObjectMeta {
                name: Some(self.name().to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec![API_GROUP.to_string()]),
                resources: Some(vec![SPACES_RESOURCE.to_string()]),
                verbs: self.verbs().iter().map(|v| v.to_string()).collect(),
                ..Default::default()
            }]),
        }
    }

    /// The RoleBinding attaching `subjects` to this Role in `namespace`
    pub fn binding(self, namespace: &str, subjects: Vec<Subject>) -> RoleBinding {
        RoleBinding {
            metadata: ObjectMeta {
                name: Some(self.name().to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            role_ref: role_ref(self.name()),
            subjects: Some(subjects),
        }
    }
}

/// Subjects of both scope bindings: editor groups then viewer groups, deduplicated
///
/// Admin groups are not part of either binding, so `scope-admin` is granted to
/// the same set as `scope-reader`.
pub fn scope_subjects(spec: &OrganizationSpec) -> Vec<Subject> {
    let groups = union(&[spec.editor_groups.as_slice(), spec.viewer_groups.as_slice()]);
    subjects(&groups, &[])
}

/// The shared namespace holding an Organization's Spaces
pub fn spaces_namespace_object(organization: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(spaces_namespace(organization)),
            labels: Some(spaces_namespace_labels(organization)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Reconcile an Organization
#[instrument(skip(org, ctx), fields(organization = %org.name_any()))]
pub async fn reconcile(org: Arc<Organization>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = reconcile_key(org.as_ref());
    ctx.attempt(&key, reconcile_organization(&org.name_any(), &ctx))
        .await
}

async fn reconcile_organization(name: &str, ctx: &Context) -> Result<Action, Error> {
    let kube = ctx.kube.as_ref();

    let Some(org) = kube.get_organization(name).await? else {
        debug!("organization no longer exists");
        return Ok(Action::await_change());
    };

    if org.metadata.deletion_timestamp.is_some() {
        debug!("organization is being deleted, dependents are garbage collected");
        return Ok(Action::await_change());
    }

    let owner = org
        .controller_owner_ref(&())
        .ok_or_else(|| Error::internal(format!("organization {name} has no uid")))?;
    let ownership = Ownership::Owned(owner);

    let namespace = org.spaces_namespace();
    converge(kube, spaces_namespace_object(name), &ownership).await?;

    let subjects = scope_subjects(&org.spec);
    for scope in ScopeRole::ALL {
        converge(kube, scope.role(&namespace), &ownership).await?;
        converge(kube, scope.binding(&namespace, subjects.clone()), &ownership).await?;
    }

    info!(namespace = %namespace, "organization reconciled");
    Ok(Action::await_change())
}
