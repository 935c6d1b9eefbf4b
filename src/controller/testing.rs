//! In-memory API server for reconciler tests
//!
//! Stores Organizations, Spaces, Namespaces, Roles and RoleBindings with
//! resourceVersion checks, records every write in a journal and can be told to
//! fail writes to specific objects or to keep deleted namespaces terminating.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ObjectMeta;
use kube::{Resource, ResourceExt};

use super::{DeleteOutcome, KubeClient};
use crate::crd::{Organization, OrganizationSpec, Space, SpaceSpec};
use crate::error::api_error;
use crate::Error;

type Key = (String, String);

#[derive(Default)]
struct State {
    resource_version: u64,
    organizations: BTreeMap<String, Organization>,
    spaces: BTreeMap<Key, Space>,
    namespaces: BTreeMap<String, Namespace>,
    roles: BTreeMap<Key, Role>,
    bindings: BTreeMap<Key, RoleBinding>,
    failing: BTreeSet<(String, String)>,
    terminate_slowly: bool,
    journal: Vec<String>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn check_failure(&self, kind: &str, name: &str) -> Result<(), Error> {
        if self.failing.contains(&(kind.to_string(), name.to_string())) {
            return Err(api_error(500, "InternalError"));
        }
        Ok(())
    }
}

fn key_of<K: Resource>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

fn check_version<K: Resource>(live: Option<&K>, update: &K) -> Result<(), Error> {
    match live {
        None => Err(api_error(404, "NotFound")),
        Some(live) if live.meta().resource_version != update.meta().resource_version => {
            Err(api_error(409, "Conflict"))
        }
        Some(_) => Ok(()),
    }
}

/// In-memory stand-in for the API server
#[derive(Default)]
pub struct FakeKube {
    state: Mutex<State>,
}

impl FakeKube {
    /// Create an empty fake
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an Organization, bypassing the journal
    pub fn insert_organization(&self, mut org: Organization) {
        let mut state = self.state();
        org.metadata.resource_version = Some(state.next_version());
        state.organizations.insert(org.name_any(), org);
    }

    /// Remove an Organization, bypassing the journal
    pub fn remove_organization(&self, name: &str) {
        self.state().organizations.remove(name);
    }

    /// Store (or overwrite) a Space, bypassing the journal
    pub fn insert_space(&self, mut space: Space) {
        let mut state = self.state();
        space.metadata.resource_version = Some(state.next_version());
        state.spaces.insert(key_of(&space), space);
    }

    /// Set the deletion timestamp of a Space, as the API server does on delete
    pub fn mark_space_deleted(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        let version = state.next_version();
        let key = (namespace.to_string(), name.to_string());
        let Some(space) = state.spaces.get_mut(&key) else {
            return;
        };
        space.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        space.metadata.resource_version = Some(version);
        if space.finalizers().is_empty() {
            state.spaces.remove(&key);
        }
    }

    /// Overwrite a RoleBinding as another actor would
    pub fn put_role_binding(&self, mut binding: RoleBinding) {
        let mut state = self.state();
        binding.metadata.resource_version = Some(state.next_version());
        state.bindings.insert(key_of(&binding), binding);
    }

    /// Make every write to `kind`/`name` fail with a 500
    pub fn fail_writes_to(&self, kind: &str, name: &str) {
        self.state()
            .failing
            .insert((kind.to_string(), name.to_string()));
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    /// Keep deleted namespaces in Terminating until [`Self::complete_namespace_termination`]
    pub fn set_namespace_termination(&self, slow: bool) {
        self.state().terminate_slowly = slow;
    }

    /// Finish deleting a terminating namespace
    pub fn complete_namespace_termination(&self, name: &str) {
        let mut state = self.state();
        let terminating = state
            .namespaces
            .get(name)
            .is_some_and(|ns| ns.metadata.deletion_timestamp.is_some());
        if terminating {
            state.namespaces.remove(name);
        }
    }

    /// Stored Organization
    pub fn organization(&self, name: &str) -> Option<Organization> {
        self.state().organizations.get(name).cloned()
    }

    /// Stored Space
    pub fn space(&self, namespace: &str, name: &str) -> Option<Space> {
        self.state()
            .spaces
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Stored Namespace
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state().namespaces.get(name).cloned()
    }

    /// Stored Role
    pub fn role(&self, namespace: &str, name: &str) -> Option<Role> {
        self.state()
            .roles
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Stored RoleBinding
    pub fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.state()
            .bindings
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of create, replace and delete calls that succeeded
    pub fn write_count(&self) -> usize {
        self.state()
            .journal
            .iter()
            .filter(|entry| !entry.starts_with("finalize "))
            .count()
    }

    /// Journal entries starting with one of `prefixes`, in order
    pub fn journal_of(&self, prefixes: &[&str]) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter(|entry| prefixes.iter().any(|p| entry.starts_with(p)))
            .cloned()
            .collect()
    }
}

/// Organization with a uid and the given groups
pub fn organization(name: &str, admins: &[&str], editors: &[&str], viewers: &[&str]) -> Organization {
    let strings = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
    let mut org = Organization::new(
        name,
        OrganizationSpec {
            admin_groups: strings(admins),
            editor_groups: strings(editors),
            viewer_groups: strings(viewers),
            ..Default::default()
        },
    );
    org.metadata.uid = Some(format!("uid-{name}"));
    org
}

/// Space with the given finalizers and an empty spec
pub fn space(namespace: &str, name: &str, finalizers: &[&str]) -> Space {
    Space {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
            ..Default::default()
        },
        spec: SpaceSpec::default(),
    }
}

#[async_trait]
impl KubeClient for FakeKube {
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>, Error> {
        Ok(self.organization(name))
    }

    async fn get_space(&self, namespace: &str, name: &str) -> Result<Option<Space>, Error> {
        Ok(self.space(namespace, name))
    }

    async fn replace_space(&self, space: &Space) -> Result<Space, Error> {
        let mut state = self.state();
        state.check_failure("Space", &space.name_any())?;
        let key = key_of(space);
        check_version(state.spaces.get(&key), space)?;

        let mut stored = space.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state
            .journal
            .push(format!("replace Space/{}/{}", key.0, key.1));

        if stored.metadata.deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            state.spaces.remove(&key);
            state
                .journal
                .push(format!("finalize Space/{}/{}", key.0, key.1));
        } else {
            state.spaces.insert(key, stored.clone());
        }
        Ok(stored)
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        Ok(self.namespace(name))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error> {
        let mut state = self.state();
        let name = namespace.name_any();
        state.check_failure("Namespace", &name)?;
        if state.namespaces.contains_key(&name) {
            return Err(api_error(409, "AlreadyExists"));
        }

        let mut stored = namespace.clone();
        stored.metadata.resource_version = Some(state.next_version());
        stored
            .labels_mut()
            .insert("kubernetes.io/metadata.name".to_string(), name.clone());
        state.journal.push(format!("create Namespace/{name}"));
        state.namespaces.insert(name, stored.clone());
        Ok(stored)
    }

    async fn replace_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error> {
        let mut state = self.state();
        let name = namespace.name_any();
        state.check_failure("Namespace", &name)?;
        check_version(state.namespaces.get(&name), namespace)?;

        let mut stored = namespace.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.journal.push(format!("replace Namespace/{name}"));
        state.namespaces.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_namespace(&self, name: &str) -> Result<DeleteOutcome, Error> {
        let mut state = self.state();
        state.check_failure("Namespace", name)?;
        if !state.namespaces.contains_key(name) {
            return Ok(DeleteOutcome::AlreadyGone);
        }

        state.journal.push(format!("delete Namespace/{name}"));
        if !state.terminate_slowly {
            state.namespaces.remove(name);
            return Ok(DeleteOutcome::Deleted);
        }

        let version = state.next_version();
        if let Some(ns) = state.namespaces.get_mut(name) {
            ns.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
            ns.metadata.resource_version = Some(version);
        }
        Ok(DeleteOutcome::Terminating)
    }

    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>, Error> {
        Ok(self.role(namespace, name))
    }

    async fn create_role(&self, role: &Role) -> Result<Role, Error> {
        let mut state = self.state();
        let key = key_of(role);
        state.check_failure("Role", &key.1)?;
        if state.roles.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }

        let mut stored = role.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.journal.push(format!("create Role/{}/{}", key.0, key.1));
        state.roles.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace_role(&self, role: &Role) -> Result<Role, Error> {
        let mut state = self.state();
        let key = key_of(role);
        state.check_failure("Role", &key.1)?;
        check_version(state.roles.get(&key), role)?;

        let mut stored = role.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.journal.push(format!("replace Role/{}/{}", key.0, key.1));
        state.roles.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RoleBinding>, Error> {
        Ok(self.role_binding(namespace, name))
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error> {
        let mut state = self.state();
        let key = key_of(binding);
        state.check_failure("RoleBinding", &key.1)?;
        if state.bindings.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }

        let mut stored = binding.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state
            .journal
            .push(format!("create RoleBinding/{}/{}", key.0, key.1));
        state.bindings.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error> {
        let mut state = self.state();
        let key = key_of(binding);
        state.check_failure("RoleBinding", &key.1)?;
        check_version(state.bindings.get(&key), binding)?;

        let mut stored = binding.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state
            .journal
            .push(format!("replace RoleBinding/{}/{}", key.0, key.1));
        state.bindings.insert(key, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_replace_is_a_conflict() {
        let fake = FakeKube::new();
        fake.insert_space(space("acme-spaces", "team1", &["x/y"]));
        let stale = fake.space("acme-spaces", "team1").unwrap();
        fake.insert_space(stale.clone());

        let err = fake.replace_space(&stale).await.unwrap_err();

        assert!(err.is_conflict());
    }
}
