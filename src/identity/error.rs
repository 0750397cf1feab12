use crate::error::ApiError;
use crate::k8s::GatewayError;

/// Identity bundle provisioning failure, tagged with the stage that failed
/// so callers can decide whether it's fatal (§4.2, §7: "logged; create
/// returns 201 anyway").
#[derive(Debug, thiserror::Error)]
#[error("identity provisioning failed at stage '{stage}': {source}")]
pub struct ProvisionError {
    pub stage: &'static str,
    #[source]
    pub source: GatewayError,
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        tracing::error!(stage = err.stage, error = %err.source, "identity provisioning failed");
        ApiError::Internal(anyhow::anyhow!(err.to_string()))
    }
}
