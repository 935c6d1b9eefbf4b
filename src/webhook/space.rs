//! Space Mutation Webhook
//!
//! Handles AdmissionReview requests for Space resources, adding the deletion
//! finalizer to every Space that lacks it.

use axum::Json;
use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{debug, error, info, warn};

use crate::controller::SPACE_FINALIZER;
use crate::naming::organization_from_spaces_namespace;

/// Handle mutating admission review for Spaces
pub async fn mutate_handler(
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(mutate_space(&req).into_review())
}

/// Admit a Space write, patching in the finalizer when it is missing
///
/// Spaces outside a spaces namespace are admitted unchanged: no dedicated
/// namespace is ever derived for them, so a finalizer would only block deletion.
fn mutate_space(request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = request.uid.clone();
    let response = AdmissionResponse::from(request);

    let Some(obj) = &request.object else {
        debug!(uid = %uid, "No object in request, allowing unchanged");
        return response;
    };

    // Namespaced objects may arrive without metadata.namespace on create
    let namespace = obj
        .metadata
        .namespace
        .as_deref()
        .or(request.namespace.as_deref())
        .unwrap_or_default();
    if let Err(e) = organization_from_spaces_namespace(namespace) {
        warn!(
            uid = %uid,
            space = ?obj.metadata.name,
            error = %e,
            "Space is not in an Organization's spaces namespace, not adding finalizer"
        );
        return response;
    }

    let Some(ops) = finalizer_patch(obj) else {
        debug!(uid = %uid, space = ?obj.metadata.name, "Space unchanged");
        return response;
    };

    info!(
        uid = %uid,
        space = ?obj.metadata.name,
        namespace = ?obj.metadata.namespace,
        "Adding finalizer to space"
    );

    match response.with_patch(json_patch::Patch(ops)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

/// JSON patch adding the finalizer to `obj`, or `None` if nothing must change
///
/// Objects already being deleted are left alone: the API server rejects new
/// finalizers on them, and removing the marker must not be undone here.
pub fn finalizer_patch(obj: &DynamicObject) -> Option<Vec<PatchOperation>> {
    if obj.metadata.deletion_timestamp.is_some() {
        return None;
    }

    let marker = serde_json::Value::String(SPACE_FINALIZER.to_string());
    match &obj.metadata.finalizers {
        Some(finalizers) if finalizers.iter().any(|f| f == SPACE_FINALIZER) => None,
        Some(_) => Some(vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["metadata", "finalizers", "-"]),
            value: marker,
        })]),
        None => Some(vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["metadata", "finalizers"]),
            value: serde_json::Value::Array(vec![marker]),
        })]),
    }
}
