//! Space Custom Resource Definition
//!
//! A Space lives in the spaces namespace of its Organization and gets a
//! dedicated namespace with its own access policy.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::labels::SpaceRef;
use crate::naming::{organization_from_spaces_namespace, space_namespace};
use crate::Error;

/// Specification for a Space
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.suse.com",
    version = "v1alpha1",
    kind = "Space",
    plural = "spaces",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct SpaceSpec {
    /// Users with admin rights inside the Space
    #[serde(default)]
    pub admins: Vec<String>,

    /// Users with edit rights inside the Space
    #[serde(default)]
    pub editors: Vec<String>,

    /// Users with view rights inside the Space
    #[serde(default)]
    pub viewers: Vec<String>,

    /// Groups with admin rights, in addition to the Organization's admin groups
    #[serde(default)]
    pub admin_groups: Vec<String>,

    /// Groups with edit rights, in addition to the Organization's editor groups
    #[serde(default)]
    pub editor_groups: Vec<String>,

    /// Groups with view rights, in addition to the Organization's viewer groups
    #[serde(default)]
    pub viewer_groups: Vec<String>,
}

impl Space {
    /// Name of the Organization owning this Space, derived from its namespace
    pub fn organization_name(&self) -> Result<String, Error> {
        let namespace = self.namespace().ok_or_else(|| {
            Error::derivation(format!("space {} has no namespace", self.name_any()))
        })?;
        organization_from_spaces_namespace(&namespace)
    }

    /// Back-reference identifying this Space within `organization`
    pub fn space_ref(&self, organization: &str) -> SpaceRef {
        SpaceRef::new(organization, self.name_any())
    }

    /// Name of the namespace dedicated to this Space
    pub fn dedicated_namespace(&self, organization: &str) -> String {
        space_namespace(organization, &self.name_any())
    }

    /// Returns true once the Space has been marked for deletion
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
