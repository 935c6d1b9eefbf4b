//! Space reconciler
//!
//! A Space gets a dedicated namespace labelled with its Organization's defaults
//! and three bindings to the built-in `admin`, `edit` and `view` ClusterRoles.
//! The namespace is cluster-scoped, so it is tracked through back-reference
//! labels and removed by the finalizer protocol rather than garbage collection.
//!
//! A deleting Space is finalized without reading its Organization, which may
//! already have been garbage-collected together with the spaces namespace.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::core::ObjectMeta;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::converge::{converge, Ownership};
use super::finalizer::{deletion_state, finalize_space, DeletionState, FinalizeOutcome};
use super::rbac::{cluster_role_ref, subjects, union};
use super::{reconcile_key, Context};
use crate::crd::{OrganizationSpec, Space, SpaceSpec};
use crate::labels::{space_namespace_labels, SpaceRef};
use crate::Error;

/// How long to wait before checking a terminating namespace again
pub const NAMESPACE_DELETION_POLL: Duration = Duration::from_secs(5);

/// The three access levels bound in a Space's namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceRole {
    /// Bound to ClusterRole `admin`
    Administrators,
    /// Bound to ClusterRole `edit`
    Editors,
    /// Bound to ClusterRole `view`
    Viewers,
}

impl SpaceRole {
    /// All access levels, in convergence order
    pub const ALL: [SpaceRole; 3] = [
        SpaceRole::Administrators,
        SpaceRole::Editors,
        SpaceRole::Viewers,
    ];

    /// Name of the RoleBinding
    pub fn binding_name(self) -> &'static str {
        match self {
            SpaceRole::Administrators => "administrators",
            SpaceRole::Editors => "editors",
            SpaceRole::Viewers => "viewers",
        }
    }

    /// Name of the ClusterRole being bound
    pub fn cluster_role(self) -> &'static str {
        match self {
            SpaceRole::Administrators => "admin",
            SpaceRole::Editors => "edit",
            SpaceRole::Viewers => "view",
        }
    }

    fn organization_groups(self, org: &OrganizationSpec) -> &[String] {
        match self {
            SpaceRole::Administrators => &org.admin_groups,
            SpaceRole::Editors => &org.editor_groups,
            SpaceRole::Viewers => &org.viewer_groups,
        }
    }

    fn space_groups(self, space: &SpaceSpec) -> &[String] {
        match self {
            SpaceRole::Administrators => &space.admin_groups,
            SpaceRole::Editors => &space.editor_groups,
            SpaceRole::Viewers => &space.viewer_groups,
        }
    }

    fn users(self, space: &SpaceSpec) -> &[String] {
        match self {
            SpaceRole::Administrators => &space.admins,
            SpaceRole::Editors => &space.editors,
            SpaceRole::Viewers => &space.viewers,
        }
    }
}

/// The dedicated namespace of a Space
pub fn space_namespace_object(
    name: &str,
    org: &OrganizationSpec,
    space_ref: &SpaceRef,
) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(space_namespace_labels(
                &org.default_namespace_labels,
                space_ref,
            )),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// The binding for `role` in the Space's dedicated namespace
///
/// Groups come first (Organization groups, then Space groups, deduplicated),
/// followed by the Space's users.
pub fn space_binding(
    role: SpaceRole,
    namespace: &str,
    org: &OrganizationSpec,
    space: &SpaceSpec,
    space_ref: &SpaceRef,
) -> RoleBinding {
    let groups = union(&[role.organization_groups(org), role.space_groups(space)]);
    let users = union(&[role.users(space)]);

    RoleBinding {
        metadata: ObjectMeta {
            name: Some(role.binding_name().to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(space_ref.labels()),
            ..Default::default()
        },
        role_ref: cluster_role_ref(role.cluster_role()),
        subjects: Some(subjects(&groups, &users)),
    }
}

/// Reconcile a Space
#[instrument(
    skip(space, ctx),
    fields(space = %space.name_any(), namespace = ?space.namespace())
)]
pub async fn reconcile(space: Arc<Space>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = reconcile_key(space.as_ref());
    let namespace = space.namespace().unwrap_or_default();
    ctx.attempt(&key, reconcile_space(&namespace, &space.name_any(), &ctx))
        .await
}

async fn reconcile_space(namespace: &str, name: &str, ctx: &Context) -> Result<Action, Error> {
    let kube = ctx.kube.as_ref();

    let Some(space) = kube.get_space(namespace, name).await? else {
        debug!("space no longer exists");
        return Ok(Action::await_change());
    };

    match deletion_state(&space) {
        DeletionState::Active => converge_space(&space, ctx).await,
        DeletionState::Deleting => {
            let organization = space.organization_name()?;
            let dedicated = space.dedicated_namespace(&organization);
            // The Organization may already be gone when its spaces namespace is
            // torn down; cleanup only needs the derived names.
            match finalize_space(kube, &space, &dedicated).await? {
                FinalizeOutcome::Finalized => Ok(Action::await_change()),
                FinalizeOutcome::WaitingForNamespace => {
                    Ok(Action::requeue(NAMESPACE_DELETION_POLL))
                }
            }
        }
        DeletionState::Finalized => {
            debug!("space finalized, waiting for storage to drop it");
            Ok(Action::await_change())
        }
    }
}

/// Converge the dedicated namespace and bindings of a live Space
async fn converge_space(space: &Space, ctx: &Context) -> Result<Action, Error> {
    let kube = ctx.kube.as_ref();
    let organization = space.organization_name()?;
    let dedicated = space.dedicated_namespace(&organization);

    let org = kube
        .get_organization(&organization)
        .await?
        .ok_or_else(|| Error::derivation(format!("organization {organization} not found")))?;

    let space_ref = space.space_ref(&organization);
    converge(
        kube,
        space_namespace_object(&dedicated, &org.spec, &space_ref),
        &Ownership::CrossScope,
    )
    .await?;

    for role in SpaceRole::ALL {
        let binding = space_binding(role, &dedicated, &org.spec, &space.spec, &space_ref);
        converge(kube, binding, &Ownership::CrossScope).await?;
    }

    info!(namespace = %dedicated, "space reconciled");
    Ok(Action::await_change())
}
