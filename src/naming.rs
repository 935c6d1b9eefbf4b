//! Deterministic names of the namespaces derived from Organizations and Spaces
//!
//! The spaces namespace of an Organization is the only link between a Space and
//! its parent, so the mapping must stay reversible.

use crate::Error;

/// Suffix of the namespace holding the Space objects of an Organization
pub const SPACES_NAMESPACE_SUFFIX: &str = "-spaces";

/// Suffix of the namespace dedicated to a single Space
pub const SPACE_NAMESPACE_SUFFIX: &str = "-space";

/// Name of the namespace where all Space objects of an Organization live
pub fn spaces_namespace(organization: &str) -> String {
    format!("{organization}{SPACES_NAMESPACE_SUFFIX}")
}

/// Name of the namespace created for a Space
pub fn space_namespace(organization: &str, space: &str) -> String {
    format!("{organization}-{space}{SPACE_NAMESPACE_SUFFIX}")
}

/// Name of the Organization owning the Spaces stored in `namespace`
///
/// Inverse of [`spaces_namespace`]. A namespace without the suffix, or one that
/// would yield an empty Organization name, is rejected.
pub fn organization_from_spaces_namespace(namespace: &str) -> Result<String, Error> {
    match namespace.strip_suffix(SPACES_NAMESPACE_SUFFIX) {
        Some(organization) if !organization.is_empty() => Ok(organization.to_string()),
        _ => Err(Error::derivation(format!(
            "unrecognized spaces namespace format: {namespace:?}"
        ))),
    }
}
