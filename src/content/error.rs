use crate::error::ApiError;

/// Errors from proxying a request to a content sidecar Service (§4.5). Only
/// the non-soft-fail operations (file read/write, push, abandon) surface
/// this; list/diff degrade internally instead of constructing it.
#[derive(Debug, thiserror::Error)]
pub enum ContentRouterError {
    #[error("content sidecar unreachable: {0}")]
    Transport(String),

    #[error("content sidecar returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl From<reqwest::Error> for ContentRouterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ContentRouterError> for ApiError {
    fn from(err: ContentRouterError) -> Self {
        match err {
            ContentRouterError::Transport(msg) => {
                tracing::warn!(detail = %msg, "content sidecar transport error");
                Self::ServiceUnavailable("content sidecar unreachable".into())
            }
            ContentRouterError::Upstream { status: 404, body } => Self::NotFound(body),
            ContentRouterError::Upstream { status, body } => {
                tracing::warn!(status, detail = %body, "content sidecar error response");
                Self::ServiceUnavailable(format!("content sidecar returned {status}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_404_maps_to_not_found() {
        let api: ApiError = ContentRouterError::Upstream { status: 404, body: "missing".into() }.into();
        assert!(matches!(api, ApiError::NotFound(_)));
    }

    #[test]
    fn transport_maps_to_service_unavailable() {
        let api: ApiError = ContentRouterError::Transport("connection refused".into()).into();
        assert!(matches!(api, ApiError::ServiceUnavailable(_)));
    }

    #[test]
    fn upstream_500_maps_to_service_unavailable() {
        let api: ApiError = ContentRouterError::Upstream { status: 500, body: "boom".into() }.into();
        assert!(matches!(api, ApiError::ServiceUnavailable(_)));
    }
}
