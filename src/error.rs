use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::k8s::GatewayError;

#[derive(Debug, thiserror::Error)]
#[allow(dead_code)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error")]
    Validation(Vec<String>),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "unauthorized" }),
            ),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                serde_json::json!({ "error": "forbidden" }),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg })),
            Self::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({ "error": msg })),
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "error": "validation error", "fields": errors }),
            ),
            Self::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": msg }),
            ),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        tracing::error!(error = %err, "kubernetes error");
        Self::Internal(err.into())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!(error = %err, "upstream proxy error");
        Self::ServiceUnavailable("upstream content service unreachable".into())
    }
}

/// Maps the Cluster Gateway's error kinds onto the HTTP-facing variants per
/// the error table: NotFound -> 404, AlreadyExists -> 409, Conflict -> 409,
/// Forbidden -> 403, Timeout/Transport -> 500 (the gateway call failed
/// outright; callers that want soft-fail degrade before this conversion).
impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(msg) => Self::NotFound(msg),
            GatewayError::AlreadyExists(msg) | GatewayError::Conflict(msg) => Self::Conflict(msg),
            GatewayError::Forbidden(msg) => {
                tracing::warn!(detail = %msg, "cluster gateway forbidden");
                Self::Forbidden
            }
            GatewayError::Timeout(msg) => {
                tracing::error!(detail = %msg, "cluster gateway timeout");
                Self::Internal(anyhow::anyhow!("cluster gateway timeout: {msg}"))
            }
            GatewayError::Transport(msg) => {
                tracing::error!(detail = %msg, "cluster gateway transport error");
                Self::Internal(anyhow::anyhow!("cluster gateway transport error: {msg}"))
            }
            GatewayError::Other(msg) => {
                tracing::error!(detail = %msg, "cluster gateway error");
                Self::Internal(anyhow::anyhow!(msg))
            }
        }
    }
}
