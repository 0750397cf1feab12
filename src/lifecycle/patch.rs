use kube::api::{Patch, PatchParams};

use super::error::LifecycleError;
use crate::k8s::resources::agentic_session;
use crate::k8s::{Gateway, GatewayError};

/// `PATCH :session` (§4.3 Patch): annotation-only merge into
/// `metadata.annotations`; any other top-level field in the request body is
/// ignored rather than rejected.
#[tracing::instrument(skip(gw, annotations), fields(%project, %name), err)]
pub async fn patch_annotations(
    gw: &Gateway,
    project: &str,
    name: &str,
    annotations: std::collections::BTreeMap<String, String>,
) -> Result<(), LifecycleError> {
    let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
    let api = gw.dynamic(project, &agentic_session());
    match api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            Err(LifecycleError::NotFound(name.to_owned()))
        }
        Err(e) => Err(GatewayError::from(e).into()),
    }
}

#[cfg(test)]
mod tests {
    // Cluster-calling; covered at the handler/integration level per the
    // teacher's own split (deployer::reconciler has no standalone unit tests
    // either, only the pure helpers it delegates to).
}
