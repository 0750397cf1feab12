use async_trait::async_trait;

/// Resolves a short-lived Git token for a user on demand; never persisted in
/// the runner Secret (§4.2). The real implementation is backed by the
/// out-of-scope OAuth/identity discovery system; tests and any deployment
/// that doesn't need Git push can use `NoopGitTokenResolver`.
#[async_trait]
pub trait GitTokenResolver: Send + Sync {
    async fn resolve(&self, project: &str, user_id: &str) -> Option<String>;
}

/// Always returns `None`; absence of a Git token is non-fatal per §4.5.
pub struct NoopGitTokenResolver;

#[async_trait]
impl GitTokenResolver for NoopGitTokenResolver {
    async fn resolve(&self, _project: &str, _user_id: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_resolver_returns_none() {
        let resolver = NoopGitTokenResolver;
        assert!(resolver.resolve("p1", "u1").await.is_none());
    }
}
