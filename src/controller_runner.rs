//! Controller runner - builds controller futures for Organizations and Spaces
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller. This keeps controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use crate::controller::{
    back_reference_selector, error_policy, organization_key_for, reconcile_organization,
    reconcile_space, space_key_for, Context,
};
use crate::crd::{Organization, Space};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller future ready to be polled
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the Organization controller
///
/// Changes to the namespace, roles and bindings an Organization controls are
/// mapped back to it through their owner reference.
pub fn build_organization_controllers(
    client: Client,
    ctx: Arc<Context>,
    concurrency: u16,
) -> Vec<ControllerFuture> {
    let organizations: Api<Organization> = Api::all(client.clone());

    tracing::info!("- Organization controller");

    vec![Box::pin(
        Controller::new(organizations, watcher_config())
            .with_config(ControllerConfig::default().concurrency(concurrency))
            .watches(
                Api::<Namespace>::all(client.clone()),
                watcher_config(),
                |ns| organization_key_for(&ns),
            )
            .watches(Api::<Role>::all(client.clone()), watcher_config(), |role| {
                organization_key_for(&role)
            })
            .watches(
                Api::<RoleBinding>::all(client),
                watcher_config(),
                |binding| organization_key_for(&binding),
            )
            .shutdown_on_signal()
            .run(reconcile_organization, error_policy::<Organization>, ctx)
            .for_each(log_reconcile_result("Organization")),
    )]
}

/// Build the Space controller
///
/// Namespaces and bindings cannot be owned by a Space, so only objects carrying
/// both back-reference labels are watched and mapped to their Space.
pub fn build_space_controllers(
    client: Client,
    ctx: Arc<Context>,
    concurrency: u16,
) -> Vec<ControllerFuture> {
    let spaces: Api<Space> = Api::all(client.clone());
    let selector = back_reference_selector();

    tracing::info!("- Space controller");

    vec![Box::pin(
        Controller::new(spaces, watcher_config())
            .with_config(ControllerConfig::default().concurrency(concurrency))
            .watches(
                Api::<Namespace>::all(client.clone()),
                watcher_config().labels(&selector),
                |ns| space_key_for(&ns),
            )
            .watches(
                Api::<RoleBinding>::all(client),
                watcher_config().labels(&selector),
                |binding| space_key_for(&binding),
            )
            .shutdown_on_signal()
            .run(reconcile_space, error_policy::<Space>, ctx)
            .for_each(log_reconcile_result("Space")),
    )]
}

/// Build every controller the operator runs
pub fn build_controllers(
    client: Client,
    ctx: Arc<Context>,
    concurrency: u16,
) -> Vec<ControllerFuture> {
    let mut controllers = build_organization_controllers(client.clone(), ctx.clone(), concurrency);
    controllers.extend(build_space_controllers(client, ctx, concurrency));
    controllers
}

/// Create a closure that logs reconciliation results
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
