//! Custom Resource Definitions for the Organization operator
//!
//! This module contains all CRD definitions used by the operator, plus helpers
//! to render them for deployment and to install them on startup.

mod organization;
mod space;

pub use organization::{Organization, OrganizationSpec, OrganizationStatus};
pub use space::{Space, SpaceSpec};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use crate::{Error, FIELD_MANAGER};

/// Every CRD the operator serves
pub fn definitions() -> Vec<CustomResourceDefinition> {
    vec![Organization::crd(), Space::crd()]
}

/// All CRDs as a multi-document YAML stream
pub fn render_yaml() -> Result<String, Error> {
    let mut out = String::new();
    for crd in definitions() {
        let doc = serde_yaml::to_string(&crd)
            .map_err(|e| Error::serialization(format!("failed to render CRD: {e}")))?;
        out.push_str("---\n");
        out.push_str(&doc);
    }
    Ok(out)
}

/// Install or update the CRDs using server-side apply
pub async fn install(client: &Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in definitions() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!("Installing {} CRD...", name);
        crds.patch(&name, &params, &Patch::Apply(&crd)).await?;
    }

    tracing::info!("CRDs installed/updated");
    Ok(())
}
