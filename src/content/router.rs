//! Content Access Router (§4.5): picks the backing content sidecar Service
//! for a session, forwards the caller's bearer token and (on push) a
//! short-lived Git token, and applies the soft-fail degrade table from §7
//! for list/diff versus the hard-fail table for file read/write/push/abandon.

use std::time::Duration;

use axum::http::HeaderMap;
use serde_json::{json, Value};

use super::error::ContentRouterError;
use crate::identity::GitTokenResolver;
use crate::k8s::Gateway;
use crate::naming;

/// The caller's bearer token, resolved once per request and forwarded
/// verbatim to the sidecar.
pub struct ForwardAuth {
    pub bearer: Option<String>,
}

/// `Authorization`, falling back to `X-Forwarded-Access-Token` (§4.5).
pub fn resolve_forward_auth(headers: &HeaderMap) -> ForwardAuth {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            headers
                .get("x-forwarded-access-token")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        });
    ForwardAuth { bearer }
}

pub struct ContentRouter {
    http: reqwest::Client,
    timeout: Duration,
}

impl ContentRouter {
    pub fn new(http: reqwest::Client, timeout_seconds: u64) -> Self {
        Self { http, timeout: Duration::from_secs(timeout_seconds) }
    }

    /// Try `temp-content-<session>` first, falling back to
    /// `ambient-content-<session>` when it doesn't exist or the lookup fails
    /// (§4.5 step 1-2; "fall back... if the impersonated client is
    /// unavailable" covers the Err branch here too).
    pub async fn resolve_service_name(&self, gw: &Gateway, project: &str, session: &str) -> String {
        let temp_name = naming::temp_content_service(session);
        match gw.services(project).get(&temp_name).await {
            Ok(_) => temp_name,
            Err(_) => naming::ambient_content_service(session),
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        service: &str,
        project: &str,
        path: &str,
        auth: &ForwardAuth,
        github_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<reqwest::Response, ContentRouterError> {
        let url = format!("{}{path}", base_url(service, project));
        let mut req = self.http.request(method, url).timeout(self.timeout);
        if let Some(token) = &auth.bearer {
            req = req.bearer_auth(token);
        }
        if let Some(token) = github_token {
            req = req.header("X-GitHub-Token", token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        Ok(req.send().await?)
    }

    /// `GET /content/list?path=...`. Upstream transport failure or a 404
    /// (workspace not yet created) both soften to `{"items": []}` (§4.5, §7).
    pub async fn list(
        &self,
        gw: &Gateway,
        project: &str,
        session: &str,
        auth: &ForwardAuth,
        path: &str,
    ) -> Value {
        let service = self.resolve_service_name(gw, project, session).await;
        let sidecar_path = format!("/content/list?path={}", urlencode(path));
        match self
            .request(reqwest::Method::GET, &service, project, &sidecar_path, auth, None, None)
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<Value>().await.unwrap_or_else(|_| json!({ "items": [] }))
            }
            _ => json!({ "items": [] }),
        }
    }

    /// `GET /content/github/diff?...`. Same soft-fail policy as `list`, but
    /// degrading to zero counts instead of an empty list (§4.5, §7).
    pub async fn diff(
        &self,
        gw: &Gateway,
        project: &str,
        session: &str,
        auth: &ForwardAuth,
        repo_path: &str,
    ) -> Value {
        let service = self.resolve_service_name(gw, project, session).await;
        let sidecar_path = format!("/content/github/diff?repoPath={}", urlencode(repo_path));
        match self
            .request(reqwest::Method::GET, &service, project, &sidecar_path, auth, None, None)
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.json::<Value>().await.unwrap_or_else(|_| zero_diff()),
            _ => zero_diff(),
        }
    }

    /// `GET /content/file?path=...`. File reads never degrade: transport
    /// failure or a non-2xx status surfaces as `ContentRouterError` (§7).
    pub async fn read_file(
        &self,
        gw: &Gateway,
        project: &str,
        session: &str,
        auth: &ForwardAuth,
        path: &str,
    ) -> Result<(Vec<u8>, Option<String>), ContentRouterError> {
        let service = self.resolve_service_name(gw, project, session).await;
        let sidecar_path = format!("/content/file?path={}", urlencode(path));
        let resp = self
            .request(reqwest::Method::GET, &service, project, &sidecar_path, auth, None, None)
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ContentRouterError::Upstream { status: status.as_u16(), body });
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = resp.bytes().await?.to_vec();
        Ok((bytes, content_type))
    }

    /// `POST /content/write`. Never degrades (§7).
    pub async fn write_file(
        &self,
        gw: &Gateway,
        project: &str,
        session: &str,
        auth: &ForwardAuth,
        path: &str,
        content: &str,
        encoding: &str,
    ) -> Result<Value, ContentRouterError> {
        let service = self.resolve_service_name(gw, project, session).await;
        let body = json!({ "path": path, "content": content, "encoding": encoding });
        self.post_json(&service, project, "/content/write", auth, None, body).await
    }

    /// `POST /content/github/push`. Attaches `X-GitHub-Token` if
    /// `git_token_resolver` resolves one for `user_id`; absence is non-fatal
    /// (§4.5, §4.2).
    #[allow(clippy::too_many_arguments)]
    pub async fn push(
        &self,
        gw: &Gateway,
        project: &str,
        session: &str,
        auth: &ForwardAuth,
        git_tokens: &dyn GitTokenResolver,
        user_id: Option<&str>,
        repo_path: &str,
        commit_message: &str,
        branch: Option<&str>,
        output_repo_url: Option<&str>,
    ) -> Result<Value, ContentRouterError> {
        let service = self.resolve_service_name(gw, project, session).await;
        let github_token = match user_id {
            Some(uid) if !uid.is_empty() => git_tokens.resolve(project, uid).await,
            _ => None,
        };
        let body = json!({
            "repoPath": repo_path,
            "commitMessage": commit_message,
            "branch": branch,
            "outputRepoUrl": output_repo_url,
        });
        self.post_json(&service, project, "/content/github/push", auth, github_token.as_deref(), body)
            .await
    }

    /// `POST /content/github/abandon`. Never degrades (§7).
    pub async fn abandon(
        &self,
        gw: &Gateway,
        project: &str,
        session: &str,
        auth: &ForwardAuth,
        repo_path: &str,
    ) -> Result<Value, ContentRouterError> {
        let service = self.resolve_service_name(gw, project, session).await;
        let body = json!({ "repoPath": repo_path });
        self.post_json(&service, project, "/content/github/abandon", auth, None, body).await
    }

    async fn post_json(
        &self,
        service: &str,
        project: &str,
        sidecar_path: &str,
        auth: &ForwardAuth,
        github_token: Option<&str>,
        body: Value,
    ) -> Result<Value, ContentRouterError> {
        let resp = self
            .request(reqwest::Method::POST, service, project, sidecar_path, auth, github_token, Some(body))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ContentRouterError::Upstream { status: status.as_u16(), body: text });
        }
        Ok(resp.json::<Value>().await.unwrap_or(Value::Null))
    }
}

fn base_url(service: &str, project: &str) -> String {
    format!("http://{service}.{project}.svc:8080")
}

fn zero_diff() -> Value {
    json!({ "files": { "added": [], "removed": [] }, "total_added": 0, "total_removed": 0 })
}

fn urlencode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_matches_spec_format() {
        assert_eq!(base_url("temp-content-s1", "p1"), "http://temp-content-s1.p1.svc:8080");
    }

    #[test]
    fn zero_diff_has_zero_counts() {
        let v = zero_diff();
        assert_eq!(v["total_added"], 0);
        assert_eq!(v["total_removed"], 0);
    }

    #[test]
    fn resolve_forward_auth_prefers_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        headers.insert("x-forwarded-access-token", "xyz".parse().unwrap());
        let auth = resolve_forward_auth(&headers);
        assert_eq!(auth.bearer.as_deref(), Some("abc"));
    }

    #[test]
    fn resolve_forward_auth_falls_back_to_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-access-token", "xyz".parse().unwrap());
        let auth = resolve_forward_auth(&headers);
        assert_eq!(auth.bearer.as_deref(), Some("xyz"));
    }

    #[test]
    fn resolve_forward_auth_absent_is_none() {
        let headers = HeaderMap::new();
        let auth = resolve_forward_auth(&headers);
        assert!(auth.bearer.is_none());
    }

    #[test]
    fn urlencode_escapes_spaces() {
        assert_eq!(urlencode("src dir"), "src+dir");
    }
}
