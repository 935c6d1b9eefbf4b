//! Controller implementations for the Organization and Space CRDs
//!
//! Reconcilers are level-triggered: every attempt re-reads the resource, derives
//! the full desired state and converges each dependent object. Nothing is carried
//! between attempts except the per-key retry bookkeeping in [`Context`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::warn;

mod client;
mod converge;
mod finalizer;
mod index;
mod organization;
mod rbac;
mod space;
#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
pub use client::MockKubeClient;
pub use client::{DeleteOutcome, KubeClient, KubeClientImpl};
pub use converge::{converge, ConvergeOutcome, Convergent, Ownership, NAMESPACE_NAME_LABEL};
pub use finalizer::{
    deletion_state, finalize_space, has_finalizer, without_finalizer, DeletionState,
    FinalizeOutcome, SPACE_FINALIZER,
};
pub use index::{back_reference_selector, organization_key_for, space_key, space_key_for};
pub use organization::{
    reconcile as reconcile_organization, scope_subjects, spaces_namespace_object, ScopeRole,
};
pub use rbac::RBAC_API_GROUP;
pub use space::{
    reconcile as reconcile_space, space_binding, space_namespace_object, SpaceRole,
    NAMESPACE_DELETION_POLL,
};

use crate::retry::{RequeueBackoff, RetryConfig};
use crate::Error;

/// Default time budget of a single reconciliation attempt
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Controller context shared by every reconciliation
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Time budget of one reconciliation attempt
    pub reconcile_timeout: Duration,
    /// Per-key failure tracking for the requeue policy
    pub backoff: RequeueBackoff,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a new controller context with the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self::builder(client).build()
    }

    /// Create a context for testing with a custom client
    ///
    /// For production code, use [`Context::builder`].
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            backoff: RequeueBackoff::default(),
        }
    }

    /// Run one reconciliation attempt for `key` under the time budget
    ///
    /// A successful attempt clears the key's failure history. An attempt that
    /// overruns is abandoned and reported as [`Error::Timeout`].
    pub async fn attempt<F>(&self, key: &str, reconciliation: F) -> Result<Action, Error>
    where
        F: Future<Output = Result<Action, Error>>,
    {
        match tokio::time::timeout(self.reconcile_timeout, reconciliation).await {
            Ok(Ok(action)) => {
                self.backoff.reset(key);
                Ok(action)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout {
                key: key.to_string(),
                seconds: self.reconcile_timeout.as_secs(),
            }),
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    reconcile_timeout: Duration,
    backoff: RetryConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            backoff: RetryConfig::default(),
        }
    }

    /// Set the time budget of one reconciliation attempt
    pub fn reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    /// Set the backoff policy applied to failed reconciliations
    pub fn backoff(mut self, backoff: RetryConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let client = self.client;
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(client))),
            reconcile_timeout: self.reconcile_timeout,
            backoff: RequeueBackoff::new(self.backoff),
        }
    }
}

/// Queue key of a resource: `Kind/name` or `Kind/namespace/name`
pub fn reconcile_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}/{}", K::kind(&()), ns, obj.name_any()),
        None => format!("{}/{}", K::kind(&()), obj.name_any()),
    }
}

/// Error policy shared by both controllers
///
/// Requeues the key with exponential backoff and jitter based on how many
/// attempts in a row have failed for it.
pub fn error_policy<K: Resource<DynamicType = ()>>(
    obj: Arc<K>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let key = reconcile_key(obj.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    warn!(
        %key,
        error = %error,
        failures = ctx.backoff.failures(&key),
        delay_ms = delay.as_millis() as u64,
        "reconciliation failed, requeueing"
    );
    Action::requeue(delay)
}
