pub mod project;
pub mod session;

use std::sync::Arc;

use crate::config::Config;
use crate::identity::{GitTokenResolver, NoopGitTokenResolver};
use crate::k8s::Gateway;

/// Shared application state. There is no database or cache layer in this
/// system (§6: all state lives in the cluster's declarative store) — the
/// backend `Gateway` and an HTTP client for the Content Access Router are
/// the only shared handles handlers need.
#[derive(Clone)]
pub struct AppState {
    /// Backend-identity cluster access, used only where §4.1 requires it.
    pub backend: Gateway,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
    /// Resolves short-lived Git tokens for `github/push` (§4.2, §4.5). Out of
    /// scope OAuth/identity discovery backs the real implementation; defaults
    /// to a resolver that always returns `None`.
    pub git_tokens: Arc<dyn GitTokenResolver>,
}

impl AppState {
    pub fn new(backend: Gateway, config: Config) -> Self {
        let http = reqwest::Client::builder()
            .build()
            .expect("building reqwest client");
        Self {
            backend,
            http,
            config: Arc::new(config),
            git_tokens: Arc::new(NoopGitTokenResolver),
        }
    }
}
