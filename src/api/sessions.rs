//! HTTP API Surface (§4.7): the Session CRUD/lifecycle endpoints plus the
//! Content Access Router's proxied workspace/Git routes. Everything but
//! Create runs under the caller's impersonated `Gateway` (`AuthUser`); Create
//! writes under the backend identity (§4.1) but still needs the caller's
//! identity for `spec.userContext` and the audit trail.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use kube::api::ListParams;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{write_audit, AuditEntry};
use crate::auth::{self, AuthUser};
use crate::content::{self, resolve_forward_auth, ContentRouter};
use crate::error::ApiError;
use crate::k8s::{Gateway, GatewayError};
use crate::lifecycle::{self, StopOutcome};
use crate::naming;
use crate::store::session::{self, Session};
use crate::store::AppState;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/projects/{project}/agentic-sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}",
            get(get_session)
                .put(update_session)
                .patch(patch_session)
                .delete(delete_session),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/displayname",
            axum::routing::put(update_display_name),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/start",
            axum::routing::post(start_session),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/stop",
            axum::routing::post(stop_session),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/clone",
            axum::routing::post(clone_session),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/k8s-resources",
            get(k8s_resources),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/spawn-content-pod",
            axum::routing::post(spawn_content_pod),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/content-pod-status",
            get(content_pod_status),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/content-pod",
            axum::routing::delete(delete_content_pod),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/workspace",
            get(list_workspace),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/workspace/{*path}",
            get(read_workspace_file).put(write_workspace_file),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/github/push",
            axum::routing::post(github_push),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/github/abandon",
            axum::routing::post(github_abandon),
        )
        .route(
            "/api/projects/{project}/agentic-sessions/{session}/github/diff",
            get(github_diff),
        )
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    pub name: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(rename = "llmSettings")]
    pub llm_settings: Option<session::LlmSettings>,
    pub timeout: Option<i64>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(rename = "autoPushOnComplete", default)]
    pub auto_push_on_complete: bool,
    #[serde(default)]
    pub repos: Vec<session::RepoSpec>,
    #[serde(rename = "mainRepoIndex", default)]
    pub main_repo_index: i64,
    #[serde(rename = "environmentVariables", default)]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(rename = "botAccount")]
    pub bot_account: Option<session::BotAccount>,
    #[serde(rename = "resourceOverrides")]
    pub resource_overrides: Option<session::ResourceOverrides>,
    #[serde(rename = "parentSessionId")]
    pub parent_session_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateSessionRequest {
    pub prompt: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "llmSettings")]
    pub llm_settings: Option<session::LlmSettings>,
    pub timeout: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PatchSessionRequest {
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct DisplayNameRequest {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct CloneSessionRequest {
    #[serde(rename = "targetProject")]
    pub target_project: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WorkspaceListQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub content: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    #[serde(rename = "repoIndex")]
    pub repo_index: usize,
    #[serde(rename = "commitMessage")]
    pub commit_message: String,
    pub branch: Option<String>,
    #[serde(rename = "outputRepoUrl")]
    pub output_repo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AbandonRequest {
    #[serde(rename = "repoIndex")]
    pub repo_index: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct DiffQuery {
    #[serde(rename = "repoIndex")]
    pub repo_index: Option<usize>,
    #[serde(rename = "repoPath")]
    pub repo_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Session CRUD and lifecycle transitions
// ---------------------------------------------------------------------------

fn session_json(s: &Session) -> Value {
    json!({
        "apiVersion": session::API_VERSION,
        "kind": session::KIND,
        "metadata": {
            "name": s.name,
            "namespace": s.namespace,
            "uid": s.uid,
            "resourceVersion": s.resource_version,
            "annotations": s.annotations,
        },
        "spec": s.spec,
        "status": s.status,
    })
}

fn content_router(state: &AppState) -> ContentRouter {
    ContentRouter::new(state.http.clone(), state.config.proxy_timeout_seconds)
}

async fn get_or_not_found(gw: &Gateway, project: &str, name: &str) -> Result<Session, ApiError> {
    session::get(gw, project, name).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::NotFound(name.to_owned())
        } else {
            e.into()
        }
    })
}

/// Resolves `spec.repos[repo_index]` into its stable name and absolute
/// workspace path (`/sessions/<session>/workspace/<repo_name>`), used by the
/// Git push/abandon/diff endpoints, which address repos by index.
async fn resolve_repo(
    gw: &Gateway,
    project: &str,
    session_name: &str,
    repo_index: usize,
) -> Result<(Session, String), ApiError> {
    let s = get_or_not_found(gw, project, session_name).await?;
    let repo_name = session::resolve_repo_name(&s.spec, repo_index);
    let path = format!("/sessions/{session_name}/workspace/{repo_name}");
    Ok((s, path))
}

pub async fn list_sessions(
    auth: AuthUser,
    Path(project): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let api = auth
        .gateway
        .dynamic(&project, &crate::k8s::resources::agentic_session());
    let list = api
        .list(&ListParams::default())
        .await
        .map_err(GatewayError::from)?;
    let items: Vec<Value> = list.items.iter().map(|o| session_json(&session::project(o))).collect();
    Ok(Json(json!({ "items": items })))
}

pub async fn create_session(
    State(state): State<AppState>,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let caller = auth::identity_from_headers(&headers, state.config.trust_proxy_headers)?;
    auth::require_managed_project(&state.backend, &project).await?;

    validation::check_prompt(&body.prompt)?;
    validation::check_length("displayName", &body.display_name, 1, 255)?;
    if let Some(name) = &body.name {
        validation::check_name(name)?;
    }
    if let Some(timeout) = body.timeout {
        validation::check_timeout(timeout)?;
    }
    if let Some(llm) = &body.llm_settings {
        validation::check_temperature(llm.temperature)?;
        validation::check_max_tokens(llm.max_tokens)?;
    }
    let mut repos = body.repos;
    for repo in &mut repos {
        validation::check_url(&repo.input.url)?;
        if let Some(branch) = &repo.input.branch {
            validation::check_branch_name(branch)?;
        }
        if let Some(output) = &repo.output {
            validation::check_url(&output.url)?;
            if let Some(branch) = &output.branch {
                validation::check_branch_name(branch)?;
            }
        }
        if repo.name.is_empty() {
            repo.name = session::repo_name_from_url(&repo.input.url);
        }
    }

    let opts = lifecycle::CreateOptions {
        name: body.name,
        display_name: body.display_name,
        prompt: body.prompt,
        llm_model: body.llm_settings.as_ref().map(|l| l.model.clone()).unwrap_or_default(),
        llm_temperature: body.llm_settings.as_ref().map(|l| l.temperature),
        llm_max_tokens: body.llm_settings.as_ref().map(|l| l.max_tokens),
        timeout: body.timeout,
        interactive: body.interactive,
        auto_push_on_complete: body.auto_push_on_complete,
        repos,
        main_repo_index: body.main_repo_index,
        environment_variables: body.environment_variables,
        bot_account: body.bot_account,
        resource_overrides: body.resource_overrides,
        parent_session_id: body.parent_session_id,
    };

    let result = lifecycle::create(
        &state.backend,
        &project,
        opts,
        &caller,
        state.config.token_refresh_max_age_seconds,
    )
    .await?;

    write_audit(&AuditEntry {
        actor_name: &caller.username,
        action: "create",
        resource: "AgenticSession",
        resource_id: &result.name,
        project: &project,
        detail: None,
    });

    Ok((
        StatusCode::CREATED,
        Json(json!({ "name": result.name, "uid": result.uid })),
    ))
}

pub async fn get_session(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let s = get_or_not_found(&auth.gateway, &project, &name).await?;
    Ok(Json(session_json(&s)))
}

pub async fn update_session(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
    Json(body): Json<UpdateSessionRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(prompt) = &body.prompt {
        validation::check_prompt(prompt)?;
    }
    if let Some(display_name) = &body.display_name {
        validation::check_length("displayName", display_name, 1, 255)?;
    }
    if let Some(timeout) = body.timeout {
        validation::check_timeout(timeout)?;
    }
    if let Some(llm) = &body.llm_settings {
        validation::check_temperature(llm.temperature)?;
        validation::check_max_tokens(llm.max_tokens)?;
    }

    let opts = lifecycle::UpdateSpecOptions {
        prompt: body.prompt,
        display_name: body.display_name,
        llm_model: body.llm_settings.as_ref().map(|l| l.model.clone()),
        llm_temperature: body.llm_settings.as_ref().map(|l| l.temperature),
        llm_max_tokens: body.llm_settings.as_ref().map(|l| l.max_tokens),
        timeout: body.timeout,
    };
    lifecycle::update_spec(&auth.gateway, &project, &name, opts).await?;

    write_audit(&AuditEntry {
        actor_name: &auth.identity.username,
        action: "update",
        resource: "AgenticSession",
        resource_id: &name,
        project: &project,
        detail: None,
    });
    Ok(StatusCode::NO_CONTENT)
}

pub async fn patch_session(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
    Json(body): Json<PatchSessionRequest>,
) -> Result<StatusCode, ApiError> {
    lifecycle::patch_annotations(&auth.gateway, &project, &name, body.annotations).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_session(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    lifecycle::delete(&auth.gateway, &project, &name).await?;
    write_audit(&AuditEntry {
        actor_name: &auth.identity.username,
        action: "delete",
        resource: "AgenticSession",
        resource_id: &name,
        project: &project,
        detail: None,
    });
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_display_name(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
    Json(body): Json<DisplayNameRequest>,
) -> Result<StatusCode, ApiError> {
    validation::check_length("displayName", &body.display_name, 1, 255)?;
    lifecycle::update_display_name(&auth.gateway, &project, &name, body.display_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_session(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let result = lifecycle::start(
        &auth.gateway,
        &project,
        &name,
        state.config.token_refresh_max_age_seconds,
    )
    .await?;
    write_audit(&AuditEntry {
        actor_name: &auth.identity.username,
        action: "start",
        resource: "AgenticSession",
        resource_id: &name,
        project: &project,
        detail: None,
    });
    Ok(Json(json!({ "continuation": result.continuation })))
}

pub async fn stop_session(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let outcome = lifecycle::stop(&auth.gateway, &project, &name).await?;
    write_audit(&AuditEntry {
        actor_name: &auth.identity.username,
        action: "stop",
        resource: "AgenticSession",
        resource_id: &name,
        project: &project,
        detail: None,
    });
    match outcome {
        StopOutcome::Stopped => Ok(StatusCode::NO_CONTENT),
        StopOutcome::AlreadyDeleted => Ok(StatusCode::NOT_FOUND),
    }
}

pub async fn clone_session(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
    Json(body): Json<CloneSessionRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if let Some(n) = &body.name {
        validation::check_name(n)?;
    }
    let target_project = body.target_project.unwrap_or_else(|| project.clone());
    let result = lifecycle::clone(&auth.gateway, &project, &name, &target_project, body.name).await?;
    write_audit(&AuditEntry {
        actor_name: &auth.identity.username,
        action: "clone",
        resource: "AgenticSession",
        resource_id: &result.name,
        project: &target_project,
        detail: None,
    });
    Ok((
        StatusCode::CREATED,
        Json(json!({ "name": result.name, "uid": result.uid })),
    ))
}

/// `GET k8s-resources` (supplemented endpoint, see SPEC_FULL.md): a read-only
/// summary of the auxiliary resources a Session owns, for operator/UI
/// debugging without requiring `kubectl` access.
pub async fn k8s_resources(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let job_name = naming::runner_job(&name);
    let job = auth.gateway.jobs(&project).get(&job_name).await.ok();
    let sa_name = naming::service_account(&name);
    let sa_exists = auth.gateway.service_accounts(&project).get(&sa_name).await.is_ok();
    let secret_name = naming::runner_token_secret(&name);
    let secret_exists = auth.gateway.secrets(&project).get(&secret_name).await.is_ok();
    let pvc_name = naming::workspace_pvc(&name);
    let pvc_exists = auth
        .gateway
        .persistent_volume_claims(&project)
        .get(&pvc_name)
        .await
        .is_ok();
    let pods = auth
        .gateway
        .pods(&project)
        .list(&ListParams::default().labels(&format!("agentic-session={name}")))
        .await
        .map_err(GatewayError::from)?;
    let pod_names: Vec<String> = pods.items.iter().filter_map(|p| p.metadata.name.clone()).collect();

    Ok(Json(json!({
        "job": {
            "name": job_name,
            "exists": job.is_some(),
            "status": job.as_ref().and_then(|j| j.status.clone()),
        },
        "serviceAccount": { "name": sa_name, "exists": sa_exists },
        "secret": { "name": secret_name, "exists": secret_exists },
        "workspacePvc": { "name": pvc_name, "exists": pvc_exists },
        "pods": pod_names,
    })))
}

// ---------------------------------------------------------------------------
// Temp Content Pod Manager endpoints (§4.6)
// ---------------------------------------------------------------------------

pub async fn spawn_content_pod(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    match content::temp_pod::spawn(&auth.gateway, &state.config, &project, &name).await {
        Ok(content::temp_pod::SpawnOutcome::Exists { ready }) => {
            Ok(Json(json!({ "status": "exists", "ready": ready })))
        }
        Ok(content::temp_pod::SpawnOutcome::Creating { pod_name }) => {
            write_audit(&AuditEntry {
                actor_name: &auth.identity.username,
                action: "spawn-content-pod",
                resource: "Pod",
                resource_id: &pod_name,
                project: &project,
                detail: None,
            });
            Ok(Json(json!({ "status": "creating", "podName": pod_name })))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn content_pod_status(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let status = content::temp_pod::status(&auth.gateway, &project, &name).await?;
    Ok(Json(json!({
        "podName": status.pod_name,
        "phase": status.phase,
        "ready": status.ready,
        "createdAt": status.created_at,
    })))
}

pub async fn delete_content_pod(
    auth: AuthUser,
    Path((project, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    content::temp_pod::delete(&auth.gateway, &project, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Content Access Router endpoints (§4.5)
// ---------------------------------------------------------------------------

pub async fn list_workspace(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
    headers: HeaderMap,
    Query(q): Query<WorkspaceListQuery>,
) -> Json<Value> {
    let router = content_router(&state);
    let forward = resolve_forward_auth(&headers);
    Json(router.list(&auth.gateway, &project, &name, &forward, &q.path).await)
}

pub async fn read_workspace_file(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let router = content_router(&state);
    let forward = resolve_forward_auth(&headers);
    let (bytes, content_type) = router.read_file(&auth.gateway, &project, &name, &forward, &path).await?;
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_owned());
    Ok(([(axum::http::header::CONTENT_TYPE, content_type)], bytes))
}

pub async fn write_workspace_file(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name, path)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<WriteFileRequest>,
) -> Result<Json<Value>, ApiError> {
    let router = content_router(&state);
    let forward = resolve_forward_auth(&headers);
    let result = router
        .write_file(&auth.gateway, &project, &name, &forward, &path, &body.content, &body.encoding)
        .await?;
    Ok(Json(result))
}

pub async fn github_push(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<PushRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(branch) = &body.branch {
        validation::check_branch_name(branch)?;
    }
    let (session, repo_path) = resolve_repo(&auth.gateway, &project, &name, body.repo_index).await?;
    let router = content_router(&state);
    let forward = resolve_forward_auth(&headers);
    let user_id = Some(session.spec.user_context.user_id.as_str()).filter(|u| !u.is_empty());

    let result = router
        .push(
            &auth.gateway,
            &project,
            &name,
            &forward,
            state.git_tokens.as_ref(),
            user_id,
            &repo_path,
            &body.commit_message,
            body.branch.as_deref(),
            body.output_repo_url.as_deref(),
        )
        .await?;

    session::set_repo_status(&auth.gateway, &project, &name, body.repo_index, "pushed").await?;
    write_audit(&AuditEntry {
        actor_name: &auth.identity.username,
        action: "github-push",
        resource: "AgenticSession",
        resource_id: &name,
        project: &project,
        detail: Some(json!({ "repoIndex": body.repo_index })),
    });

    Ok(Json(result))
}

pub async fn github_abandon(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<AbandonRequest>,
) -> Result<Json<Value>, ApiError> {
    let (_, repo_path) = resolve_repo(&auth.gateway, &project, &name, body.repo_index).await?;
    let router = content_router(&state);
    let forward = resolve_forward_auth(&headers);
    let result = router.abandon(&auth.gateway, &project, &name, &forward, &repo_path).await?;

    write_audit(&AuditEntry {
        actor_name: &auth.identity.username,
        action: "github-abandon",
        resource: "AgenticSession",
        resource_id: &name,
        project: &project,
        detail: Some(json!({ "repoIndex": body.repo_index })),
    });

    Ok(Json(result))
}

pub async fn github_diff(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
    headers: HeaderMap,
    Query(q): Query<DiffQuery>,
) -> Result<Json<Value>, ApiError> {
    let repo_path = match q.repo_path {
        Some(path) => path,
        None => {
            let idx = q.repo_index.unwrap_or(0);
            resolve_repo(&auth.gateway, &project, &name, idx).await?.1
        }
    };
    let router = content_router(&state);
    let forward = resolve_forward_auth(&headers);
    Ok(Json(router.diff(&auth.gateway, &project, &name, &forward, &repo_path).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_encoding_is_utf8() {
        assert_eq!(default_encoding(), "utf-8");
    }

    #[test]
    fn session_json_carries_name_and_phase() {
        let s = Session {
            name: "s1".into(),
            uid: "abc".into(),
            namespace: "proj1".into(),
            resource_version: Some("42".into()),
            annotations: BTreeMap::new(),
            spec: session::SessionSpec::default(),
            status: session::SessionStatus::default(),
        };
        let v = session_json(&s);
        assert_eq!(v["metadata"]["name"], "s1");
        assert_eq!(v["metadata"]["uid"], "abc");
        assert_eq!(v["status"]["phase"], "Pending");
    }
}
