//! Mutating Admission Webhook for Spaces
//!
//! Every Space must carry the deletion finalizer before it is stored, otherwise
//! deleting it would orphan its dedicated namespace. The webhook adds the
//! marker on create and update; the controller only ever removes it.

pub mod space;

use std::net::SocketAddr;
use std::path::Path;

use axum::{
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::Error;

/// Path the API server calls for Space mutations
pub const MUTATE_SPACE_PATH: &str = "/mutate-k8s-suse-com-v1alpha1-space";

/// Path of the liveness endpoint
pub const HEALTH_PATH: &str = "/healthz";

/// Create the webhook router with all mutation endpoints
///
/// Currently supports:
/// - POST /mutate-k8s-suse-com-v1alpha1-space - Add the finalizer to Spaces
/// - GET /healthz - Liveness probe
pub fn webhook_router() -> Router {
    Router::new()
        .route(MUTATE_SPACE_PATH, post(space::mutate_handler))
        .route(HEALTH_PATH, get(|| async { "ok" }))
}

/// Serve the webhook over TLS until the process exits
pub async fn serve(addr: SocketAddr, cert: &Path, key: &Path) -> Result<(), Error> {
    let tls_config = RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(|e| Error::internal(format!("failed to load webhook TLS material: {e}")))?;

    info!(%addr, "Starting admission webhook server");
    axum_server::bind_rustls(addr, tls_config)
        .serve(webhook_router().into_make_service())
        .await
        .map_err(|e| Error::internal(format!("webhook server failed: {e}")))
}
