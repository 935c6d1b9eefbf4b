//! Organization Custom Resource Definition
//!
//! An Organization is the top-level tenant. It owns the namespace holding its
//! Spaces and the roles controlling who may manage them.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::naming::spaces_namespace;

/// Specification for an Organization
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.suse.com",
    version = "v1alpha1",
    kind = "Organization",
    plural = "organizations",
    shortname = "org",
    status = "OrganizationStatus",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct OrganizationSpec {
    /// Names of groups with admin rights
    #[serde(default)]
    pub admin_groups: Vec<String>,

    /// Names of groups with edit rights
    #[serde(default)]
    pub editor_groups: Vec<String>,

    /// Names of groups with view rights
    #[serde(default)]
    pub viewer_groups: Vec<String>,

    /// Labels added to every namespace created for one of the Organization's Spaces
    #[serde(default)]
    pub default_namespace_labels: BTreeMap<String, String>,
}

/// Status for an Organization
///
/// Declared so the status subresource exists; the operator records nothing in it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct OrganizationStatus {}

impl Organization {
    /// Namespace holding the Spaces of this Organization
    pub fn spaces_namespace(&self) -> String {
        spaces_namespace(&self.name_any())
    }
}
