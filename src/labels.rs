//! Back-reference labels linking derived objects to their Space
//!
//! A Space cannot own its namespace or the bindings inside it, so every such
//! object carries the Organization and Space names as labels. Watches read them
//! back to find the Space to reconcile.

use std::collections::BTreeMap;

/// Label key naming the Organization a derived object belongs to
pub const ORGANIZATION_LABEL: &str = "organization-operator.k8s.suse.com/organization";

/// Label key naming the Space a derived object belongs to
pub const SPACE_LABEL: &str = "organization-operator.k8s.suse.com/space";

/// Label key set on the spaces namespace of an Organization
pub const APP_LABEL: &str = "app";

/// Identity of a Space as recorded in back-reference labels
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpaceRef {
    /// Organization name
    pub organization: String,
    /// Space name
    pub space: String,
}

impl SpaceRef {
    /// Create a reference from Organization and Space names
    pub fn new(organization: impl Into<String>, space: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            space: space.into(),
        }
    }

    /// Extract the back-reference from an object's labels
    ///
    /// Returns `None` unless both labels are present.
    pub fn from_labels(labels: Option<&BTreeMap<String, String>>) -> Option<Self> {
        let labels = labels?;
        let organization = labels.get(ORGANIZATION_LABEL)?;
        let space = labels.get(SPACE_LABEL)?;
        Some(Self::new(organization.as_str(), space.as_str()))
    }

    /// The two back-reference labels for this Space
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ORGANIZATION_LABEL.to_string(), self.organization.clone()),
            (SPACE_LABEL.to_string(), self.space.clone()),
        ])
    }
}

/// Labels of a Space's dedicated namespace
///
/// Starts from a copy of the Organization defaults and overlays the
/// back-reference labels, which win on collision. The defaults are never mutated.
pub fn space_namespace_labels(
    defaults: &BTreeMap<String, String>,
    space_ref: &SpaceRef,
) -> BTreeMap<String, String> {
    let mut labels = defaults.clone();
    labels.extend(space_ref.labels());
    labels
}

/// Labels of an Organization's spaces namespace
pub fn spaces_namespace_labels(organization: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), organization.to_string())])
}
