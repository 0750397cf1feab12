/// Cluster response kinds per §4.1. Call sites match on this instead of
/// inspecting `kube::Error` directly so retry/soft-fail policy stays in one
/// place.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl From<kube::Error> for GatewayError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) => match resp.code {
                404 => Self::NotFound(resp.message.clone()),
                409 if resp.reason == "AlreadyExists" => Self::AlreadyExists(resp.message.clone()),
                409 => Self::Conflict(resp.message.clone()),
                403 => Self::Forbidden(resp.message.clone()),
                408 | 504 => Self::Timeout(resp.message.clone()),
                _ => Self::Other(resp.message.clone()),
            },
            kube::Error::HyperResponse(_) | kube::Error::Service(_) => {
                Self::Transport(err.to_string())
            }
            _ => Self::Other(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicate() {
        assert!(GatewayError::NotFound("x".into()).is_not_found());
        assert!(!GatewayError::Conflict("x".into()).is_not_found());
    }

    #[test]
    fn already_exists_predicate() {
        assert!(GatewayError::AlreadyExists("x".into()).is_already_exists());
        assert!(!GatewayError::NotFound("x".into()).is_already_exists());
    }
}
