use super::error::LifecycleError;
use crate::k8s::Gateway;

/// `DELETE :session` (§4.3 Delete): owner references cascade to the Job,
/// Pods, Identity Bundle, Temp Pod, and Service, so no explicit cleanup is
/// needed here beyond the Delete itself (§9 "Owner-reference cascades").
#[tracing::instrument(skip(gw), fields(%project, %name), err)]
pub async fn delete(gw: &Gateway, project: &str, name: &str) -> Result<(), LifecycleError> {
    let api = gw.dynamic(project, &crate::k8s::resources::agentic_session());
    match api.delete(name, &kube::api::DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(crate::k8s::GatewayError::from(e).into()),
    }
}
