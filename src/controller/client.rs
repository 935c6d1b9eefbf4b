//! Substrate access for the reconcilers
//!
//! Every API call a reconciler makes goes through [`KubeClient`] so tests can run
//! the reconcilers against mocks or the in-memory fake instead of a cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Organization, Space};
use crate::error::is_not_found;
use crate::Error;

/// Result of asking the API server to delete a namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The namespace is gone
    Deleted,
    /// Deletion was accepted and the namespace is still terminating
    Terminating,
    /// The namespace did not exist
    AlreadyGone,
}

/// Trait abstracting Kubernetes client operations for the reconcilers
///
/// `get_*` methods return `Ok(None)` on NotFound. `replace_*` methods send the
/// object's `resourceVersion`, so a write based on a stale read fails with a
/// conflict instead of clobbering a concurrent change.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get an Organization by name
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>, Error>;

    /// Get a Space by namespace and name
    async fn get_space(&self, namespace: &str, name: &str) -> Result<Option<Space>, Error>;

    /// Persist a modified Space (used to remove the finalizer)
    async fn replace_space(&self, space: &Space) -> Result<Space, Error>;

    /// Get a Namespace by name
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error>;

    /// Create a Namespace
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error>;

    /// Persist a modified Namespace
    async fn replace_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error>;

    /// Delete a Namespace
    async fn delete_namespace(&self, name: &str) -> Result<DeleteOutcome, Error>;

    /// Get a Role by namespace and name
    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>, Error>;

    /// Create a Role
    async fn create_role(&self, role: &Role) -> Result<Role, Error>;

    /// Persist a modified Role
    async fn replace_role(&self, role: &Role) -> Result<Role, Error>;

    /// Get a RoleBinding by namespace and name
    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RoleBinding>, Error>;

    /// Create a RoleBinding
    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error>;

    /// Persist a modified RoleBinding
    async fn replace_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, obj: &K) -> Result<Api<K>, Error>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        let namespace = obj.namespace().ok_or_else(|| {
            Error::internal(format!(
                "{} {} has no namespace",
                K::kind(&Default::default()),
                obj.name_any()
            ))
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>, Error> {
        let api: Api<Organization> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_space(&self, namespace: &str, name: &str) -> Result<Option<Space>, Error> {
        let api: Api<Space> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn replace_space(&self, space: &Space) -> Result<Space, Error> {
        let api = self.namespaced(space)?;
        Ok(api
            .replace(&space.name_any(), &PostParams::default(), space)
            .await?)
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), namespace).await?)
    }

    async fn replace_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api
            .replace(&namespace.name_any(), &PostParams::default(), namespace)
            .await?)
    }

    async fn delete_namespace(&self, name: &str) -> Result<DeleteOutcome, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            // The API server hands back the object while finalizers are still pending
            Ok(response) if response.is_left() => Ok(DeleteOutcome::Terminating),
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_not_found(&e) => {
                debug!(namespace = %name, "namespace already deleted");
                Ok(DeleteOutcome::AlreadyGone)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>, Error> {
        let api: Api<Role> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_role(&self, role: &Role) -> Result<Role, Error> {
        let api = self.namespaced(role)?;
        Ok(api.create(&PostParams::default(), role).await?)
    }

    async fn replace_role(&self, role: &Role) -> Result<Role, Error> {
        let api = self.namespaced(role)?;
        Ok(api
            .replace(&role.name_any(), &PostParams::default(), role)
            .await?)
    }

    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RoleBinding>, Error> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error> {
        let api = self.namespaced(binding)?;
        Ok(api.create(&PostParams::default(), binding).await?)
    }

    async fn replace_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error> {
        let api = self.namespaced(binding)?;
        Ok(api
            .replace(&binding.name_any(), &PostParams::default(), binding)
            .await?)
    }
}
