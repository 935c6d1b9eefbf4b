//! Space deletion protocol
//!
//! A Space's dedicated namespace is cluster-scoped and cannot be owned by the
//! namespaced Space, so garbage collection never removes it. The admission webhook
//! puts [`SPACE_FINALIZER`] on every Space; the reconciler removes it only after
//! the namespace is confirmed gone.
//!
//! ```text
//! Active --(deletionTimestamp set)--> Deleting --(namespace gone, marker removed)--> Finalized
//! ```

use kube::ResourceExt;
use tracing::{debug, info};

use super::{DeleteOutcome, KubeClient};
use crate::crd::Space;
use crate::Error;

/// Finalizer marker gating Space deletion
pub const SPACE_FINALIZER: &str = "k8s.suse.com/space-finalizer";

/// Where a Space stands in its deletion lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionState {
    /// Not marked for deletion
    Active,
    /// Marked for deletion, cleanup still pending
    Deleting,
    /// Marked for deletion and the marker is gone; storage will drop the object
    Finalized,
}

/// Result of one finalization attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The marker has been removed (or was already absent)
    Finalized,
    /// The namespace is still terminating; try again later
    WaitingForNamespace,
}

/// Check if a Space carries the deletion marker
pub fn has_finalizer(space: &Space) -> bool {
    space.finalizers().iter().any(|f| f == SPACE_FINALIZER)
}

/// Classify a Space by deletion timestamp and marker
pub fn deletion_state(space: &Space) -> DeletionState {
    match (space.is_being_deleted(), has_finalizer(space)) {
        (false, _) => DeletionState::Active,
        (true, true) => DeletionState::Deleting,
        (true, false) => DeletionState::Finalized,
    }
}

/// Copy of `space` with the marker removed and every other finalizer kept in order
pub fn without_finalizer(space: &Space) -> Space {
    let mut updated = space.clone();
    updated
        .finalizers_mut()
        .retain(|finalizer| finalizer != SPACE_FINALIZER);
    updated
}

/// Run one step of the deletion protocol for `space`
///
/// Deletes `namespace` and, once it is gone, removes the marker from the Space.
/// The marker is never removed while the namespace still exists, so a crash at
/// any point leaves the Space in a state the next attempt can finish.
pub async fn finalize_space(
    kube: &dyn KubeClient,
    space: &Space,
    namespace: &str,
) -> Result<FinalizeOutcome, Error> {
    if !has_finalizer(space) {
        debug!("finalizer already removed");
        return Ok(FinalizeOutcome::Finalized);
    }

    if let Some(live) = kube.get_namespace(namespace).await? {
        if live.metadata.deletion_timestamp.is_some() {
            debug!(namespace = %namespace, "namespace still terminating");
            return Ok(FinalizeOutcome::WaitingForNamespace);
        }

        match kube.delete_namespace(namespace).await? {
            DeleteOutcome::Terminating => {
                info!(namespace = %namespace, "namespace deletion started");
                return Ok(FinalizeOutcome::WaitingForNamespace);
            }
            DeleteOutcome::Deleted | DeleteOutcome::AlreadyGone => {
                info!(namespace = %namespace, "namespace deleted");
            }
        }
    }

    kube.replace_space(&without_finalizer(space)).await?;
    info!(space = %space.name_any(), "finalizer removed");
    Ok(FinalizeOutcome::Finalized)
}
