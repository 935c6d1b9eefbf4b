//! Mapping from dependent objects back to the resource that must be reconciled
//!
//! Watch events arrive for namespaces, roles and bindings. These functions turn
//! such an object into the key of the Organization or Space that derived it, so
//! the controller re-evaluates that resource and repairs any drift.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use crate::crd::{Organization, Space};
use crate::labels::{SpaceRef, ORGANIZATION_LABEL, SPACE_LABEL};
use crate::naming::spaces_namespace;
use crate::{API_GROUP, API_VERSION};

/// Label selector matching objects that carry both back-reference labels
pub fn back_reference_selector() -> String {
    format!("{ORGANIZATION_LABEL},{SPACE_LABEL}")
}

/// Key of the Space a labelled object belongs to
///
/// Yields nothing unless both back-reference labels are present.
pub fn space_key_for<K: ResourceExt>(obj: &K) -> Option<ObjectRef<Space>> {
    let space_ref = SpaceRef::from_labels(obj.meta().labels.as_ref())?;
    Some(space_key(&space_ref))
}

/// Key of the Space identified by `space_ref`
pub fn space_key(space_ref: &SpaceRef) -> ObjectRef<Space> {
    ObjectRef::new(&space_ref.space).within(&spaces_namespace(&space_ref.organization))
}

fn is_organization_owner(owner: &OwnerReference) -> bool {
    owner.kind == "Organization" && owner.api_version == format!("{API_GROUP}/{API_VERSION}")
}

/// Key of the Organization controlling an owned object
///
/// Organizations are cluster-scoped, so the key has no namespace even when the
/// owned object (a Role or RoleBinding) is namespaced.
pub fn organization_key_for<K: ResourceExt>(obj: &K) -> Option<ObjectRef<Organization>> {
    obj.owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true) && is_organization_owner(owner))
        .map(|owner| ObjectRef::new(&owner.name))
}
