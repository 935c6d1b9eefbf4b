//! RBAC subject helpers shared by both reconcilers

use k8s_openapi::api::rbac::v1::{RoleRef, Subject};

/// API group of RBAC objects and of User/Group subjects
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Subject kind for identity groups
pub const GROUP_KIND: &str = "Group";

/// Subject kind for individual identities
pub const USER_KIND: &str = "User";

fn subject(kind: &str, name: &str) -> Subject {
    Subject {
        kind: kind.to_string(),
        name: name.to_string(),
        api_group: Some(RBAC_API_GROUP.to_string()),
        namespace: None,
    }
}

/// Concatenate name lists, keeping the first occurrence of each name
pub fn union<'a>(lists: &[&'a [String]]) -> Vec<&'a str> {
    let mut names: Vec<&str> = Vec::new();
    for name in lists.iter().copied().flatten() {
        if !names.contains(&name.as_str()) {
            names.push(name.as_str());
        }
    }
    names
}

/// Subjects for `groups` followed by subjects for `users`
pub fn subjects(groups: &[&str], users: &[&str]) -> Vec<Subject> {
    groups
        .iter()
        .map(|g| subject(GROUP_KIND, g))
        .chain(users.iter().map(|u| subject(USER_KIND, u)))
        .collect()
}

/// Reference to a namespaced Role
pub fn role_ref(name: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: "Role".to_string(),
        name: name.to_string(),
    }
}

/// Reference to a ClusterRole
pub fn cluster_role_ref(name: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: "ClusterRole".to_string(),
        name: name.to_string(),
    }
}
