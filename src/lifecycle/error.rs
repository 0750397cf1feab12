use crate::error::ApiError;
use crate::k8s::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("target project not managed: {0}")]
    ProjectNotManaged(String),

    #[error("could not allocate a unique clone name after {0} attempts")]
    CloneNameExhausted(u32),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(msg) => Self::NotFound(msg),
            LifecycleError::BadRequest(msg) => Self::BadRequest(msg),
            LifecycleError::ProjectNotManaged(msg) => {
                tracing::warn!(project = %msg, "clone target project not managed");
                Self::Forbidden
            }
            LifecycleError::CloneNameExhausted(n) => {
                Self::Conflict(format!("exhausted {n} clone name attempts"))
            }
            LifecycleError::Gateway(e) => Self::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let api: ApiError = LifecycleError::NotFound("s1".into()).into();
        assert!(matches!(api, ApiError::NotFound(_)));
    }

    #[test]
    fn project_not_managed_maps_to_forbidden() {
        let api: ApiError = LifecycleError::ProjectNotManaged("p2".into()).into();
        assert!(matches!(api, ApiError::Forbidden));
    }

    #[test]
    fn clone_name_exhausted_maps_to_conflict() {
        let api: ApiError = LifecycleError::CloneNameExhausted(50).into();
        assert!(matches!(api, ApiError::Conflict(_)));
    }

    #[test]
    fn gateway_not_found_maps_to_404() {
        let api: ApiError = LifecycleError::Gateway(GatewayError::NotFound("x".into())).into();
        assert!(matches!(api, ApiError::NotFound(_)));
    }
}
