//! Typed read/write of the Session declarative record (§4.4). The
//! `AgenticSession` custom resource is accessed as a `DynamicObject` (no
//! compiled-in CRD schema); `parse_spec`/`parse_status` project its untyped
//! `spec`/`status` JSON trees into these structs with defensive defaults —
//! a missing field becomes its zero value, a mistyped field becomes its
//! zero value and parsing continues, it never aborts the whole record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::k8s::resources::agentic_session;
use crate::k8s::{Gateway, GatewayError};
use crate::lifecycle::Phase;

pub const API_VERSION: &str = "vteam.ambient-code/v1alpha1";
pub const KIND: &str = "AgenticSession";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f64,
    #[serde(rename = "maxTokens")]
    pub max_tokens: i64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoRef {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoSpec {
    pub input: RepoRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<RepoRef>,
    /// Derived: folder segment of `input.url`, stable across runs (invariant
    /// 6). Left blank on an incoming Create request; the handler fills it in
    /// via `repo_name_from_url` before the spec is ever written.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotAccount {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(rename = "storageClass", skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(rename = "priorityClass", skip_serializing_if = "Option::is_none")]
    pub priority_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub prompt: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "llmSettings")]
    pub llm_settings: LlmSettings,
    pub timeout: i64,
    pub interactive: bool,
    #[serde(rename = "autoPushOnComplete")]
    pub auto_push_on_complete: bool,
    pub repos: Vec<RepoSpec>,
    #[serde(rename = "mainRepoIndex")]
    pub main_repo_index: i64,
    #[serde(rename = "environmentVariables")]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(rename = "userContext")]
    pub user_context: UserContext,
    #[serde(rename = "botAccount", skip_serializing_if = "Option::is_none")]
    pub bot_account: Option<BotAccount>,
    #[serde(rename = "resourceOverrides", skip_serializing_if = "Option::is_none")]
    pub resource_overrides: Option<ResourceOverrides>,
}

impl Default for SessionSpec {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            display_name: String::new(),
            llm_settings: LlmSettings::default(),
            timeout: 300,
            interactive: false,
            auto_push_on_complete: false,
            repos: Vec::new(),
            main_repo_index: 0,
            environment_variables: BTreeMap::new(),
            user_context: UserContext::default(),
            bot_account: None,
            resource_overrides: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub name: String,
    pub status: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub message: String,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(rename = "jobName", skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    pub repos: Vec<RepoStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Full typed projection of a Session `DynamicObject`.
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub uid: String,
    pub namespace: String,
    pub resource_version: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: SessionSpec,
    pub status: SessionStatus,
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_owned()
}

fn opt_str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn i64_field(v: &Value, key: &str, default: i64) -> i64 {
    v.get(key).and_then(Value::as_i64).unwrap_or(default)
}

fn f64_field(v: &Value, key: &str, default: f64) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn bool_field(v: &Value, key: &str, default: bool) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn str_vec_field(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn string_map_field(v: &Value, key: &str) -> BTreeMap<String, String> {
    v.get(key)
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}

/// Folder segment of a repo URL, e.g. `https://git.example/org/a.git` -> `a`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("repo")
        .to_owned()
}

fn parse_repo(v: &Value) -> RepoSpec {
    let input_url = v
        .get("input")
        .map(|i| str_field(i, "url"))
        .unwrap_or_default();
    let input = RepoRef {
        url: input_url.clone(),
        branch: v.get("input").and_then(|i| opt_str_field(i, "branch")),
    };
    let output = v.get("output").and_then(|o| {
        let url = str_field(o, "url");
        if url.is_empty() {
            None
        } else {
            Some(RepoRef {
                url,
                branch: opt_str_field(o, "branch"),
            })
        }
    });
    let name = opt_str_field(v, "name").unwrap_or_else(|| repo_name_from_url(&input_url));
    RepoSpec { input, output, name }
}

/// Defensive parse of the `spec` sub-tree: missing -> zero value, mistyped
/// -> zero value, never aborts (§4.4).
pub fn parse_spec(spec: &Value) -> SessionSpec {
    let llm = spec.get("llmSettings");
    let llm_settings = LlmSettings {
        model: llm.map(|l| str_field(l, "model")).unwrap_or_default(),
        temperature: llm.map(|l| f64_field(l, "temperature", 0.7)).unwrap_or(0.7),
        max_tokens: llm.map(|l| i64_field(l, "maxTokens", 4000)).unwrap_or(4000),
    };

    let repos = spec
        .get("repos")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_repo).collect())
        .unwrap_or_default();

    let user_context = spec.get("userContext").map(|u| UserContext {
        user_id: str_field(u, "userId"),
        display_name: str_field(u, "displayName"),
        groups: str_vec_field(u, "groups"),
    });

    let bot_account = spec.get("botAccount").and_then(|b| {
        let name = str_field(b, "name");
        if name.is_empty() { None } else { Some(BotAccount { name }) }
    });

    let resource_overrides = spec.get("resourceOverrides").map(|r| ResourceOverrides {
        cpu: opt_str_field(r, "cpu"),
        memory: opt_str_field(r, "memory"),
        storage_class: opt_str_field(r, "storageClass"),
        priority_class: opt_str_field(r, "priorityClass"),
    });

    SessionSpec {
        prompt: str_field(spec, "prompt"),
        display_name: str_field(spec, "displayName"),
        llm_settings,
        timeout: i64_field(spec, "timeout", 300),
        interactive: bool_field(spec, "interactive", false),
        auto_push_on_complete: bool_field(spec, "autoPushOnComplete", false),
        repos,
        main_repo_index: i64_field(spec, "mainRepoIndex", 0),
        environment_variables: string_map_field(spec, "environmentVariables"),
        user_context: user_context.unwrap_or_default(),
        bot_account,
        resource_overrides,
    }
}

/// Defensive parse of the `status` sub-tree (§4.4).
pub fn parse_status(status: &Value) -> SessionStatus {
    let phase = status
        .get("phase")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Phase>().ok())
        .unwrap_or(Phase::Pending);

    let repos = status
        .get("repos")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|r| RepoStatus {
                    name: str_field(r, "name"),
                    status: str_field(r, "status"),
                    last_updated: str_field(r, "last_updated"),
                })
                .collect()
        })
        .unwrap_or_default();

    SessionStatus {
        phase,
        message: str_field(status, "message"),
        start_time: status
            .get("startTime")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        completion_time: status
            .get("completionTime")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        job_name: opt_str_field(status, "jobName"),
        repos,
        result: status.get("result").cloned(),
    }
}

/// Project a `DynamicObject` into a typed `Session`.
pub fn project(obj: &DynamicObject) -> Session {
    let spec = obj.data.get("spec").cloned().unwrap_or(Value::Null);
    let status = obj.data.get("status").cloned().unwrap_or(Value::Null);
    Session {
        name: obj.metadata.name.clone().unwrap_or_default(),
        uid: obj.metadata.uid.clone().unwrap_or_default(),
        namespace: obj.metadata.namespace.clone().unwrap_or_default(),
        resource_version: obj.metadata.resource_version.clone(),
        annotations: obj
            .metadata
            .annotations
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect(),
        spec: parse_spec(&spec),
        status: parse_status(&status),
    }
}

pub async fn get(gw: &Gateway, project: &str, name: &str) -> Result<Session, GatewayError> {
    let api = gw.dynamic(project, &agentic_session());
    let obj = api.get(name).await?;
    Ok(self::project(&obj))
}

pub async fn get_raw(gw: &Gateway, project: &str, name: &str) -> Result<DynamicObject, GatewayError> {
    let api = gw.dynamic(project, &agentic_session());
    api.get(name).await.map_err(Into::into)
}

/// Write `spec` via a merge patch. Used by Update/UpdateDisplayName/Start.
pub async fn write_spec(
    gw: &Gateway,
    project: &str,
    name: &str,
    spec: &SessionSpec,
) -> Result<(), GatewayError> {
    let api = gw.dynamic(project, &agentic_session());
    let patch = serde_json::json!({ "spec": spec });
    api.patch(
        name,
        &kube::api::PatchParams::default(),
        &kube::api::Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Write `status` via the status subresource, retrying on Conflict up to 3
/// times per §5/§7.
pub async fn update_status<F>(
    gw: &Gateway,
    project: &str,
    name: &str,
    mut mutate: F,
) -> Result<(), GatewayError>
where
    F: FnMut(&mut SessionStatus),
{
    const MAX_RETRIES: usize = 3;
    let api = gw.dynamic(project, &agentic_session());

    for attempt in 0..=MAX_RETRIES {
        let obj = api.get(name).await?;
        let mut status = parse_status(obj.data.get("status").unwrap_or(&Value::Null));
        mutate(&mut status);
        let patch = serde_json::json!({ "status": status });
        match api
            .patch_status(
                name,
                &kube::api::PatchParams::default(),
                &kube::api::Patch::Merge(&patch),
            )
            .await
        {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 && attempt < MAX_RETRIES => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(GatewayError::Conflict(format!(
        "UpdateStatus conflict on {name} after {MAX_RETRIES} retries"
    )))
}

/// `setRepoStatus`: resolves the repo name then upserts into `status.repos[]`,
/// idempotent except for `last_updated` (§4.4, testable property 5).
pub async fn set_repo_status(
    gw: &Gateway,
    project: &str,
    name: &str,
    idx: usize,
    new_status: &str,
) -> Result<(), GatewayError> {
    let session = get(gw, project, name).await?;
    let repo_name = resolve_repo_name(&session.spec, idx);
    let now = Utc::now().to_rfc3339();

    update_status(gw, project, name, |status| {
        upsert_repo_status(&mut status.repos, &repo_name, new_status, &now);
    })
    .await
}

/// Pure upsert helper, split out so it's testable without a cluster.
pub fn upsert_repo_status(repos: &mut Vec<RepoStatus>, repo_name: &str, status: &str, now: &str) {
    if let Some(existing) = repos.iter_mut().find(|r| r.name == repo_name) {
        existing.status = status.to_owned();
        existing.last_updated = now.to_owned();
    } else {
        repos.push(RepoStatus {
            name: repo_name.to_owned(),
            status: status.to_owned(),
            last_updated: now.to_owned(),
        });
    }
}

/// Resolve `repoName` by (i) `spec.repos[idx].name`, (ii) folder-of-URL,
/// (iii) fallback `repo-<idx>` (§4.4).
pub fn resolve_repo_name(spec: &SessionSpec, idx: usize) -> String {
    if let Some(repo) = spec.repos.get(idx) {
        if !repo.name.is_empty() {
            return repo.name.clone();
        }
        if !repo.input.url.is_empty() {
            return repo_name_from_url(&repo.input.url);
        }
    }
    format!("repo-{idx}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_from_url_strips_git_suffix() {
        assert_eq!(repo_name_from_url("https://git.example/org/a.git"), "a");
        assert_eq!(repo_name_from_url("https://git.example/org/a"), "a");
        assert_eq!(repo_name_from_url("https://git.example/org/a/"), "a");
    }

    #[test]
    fn parse_spec_defaults_missing_fields() {
        let spec = serde_json::json!({ "prompt": "do X" });
        let parsed = parse_spec(&spec);
        assert_eq!(parsed.prompt, "do X");
        assert_eq!(parsed.timeout, 300);
        assert!(!parsed.interactive);
        assert_eq!(parsed.llm_settings.max_tokens, 4000);
        assert!(parsed.repos.is_empty());
    }

    #[test]
    fn parse_spec_tolerates_type_mismatch() {
        // timeout is a string instead of a number: falls back to default
        // rather than failing the whole parse.
        let spec = serde_json::json!({ "prompt": "do X", "timeout": "soon" });
        let parsed = parse_spec(&spec);
        assert_eq!(parsed.timeout, 300);
        assert_eq!(parsed.prompt, "do X");
    }

    #[test]
    fn parse_spec_derives_repo_name() {
        let spec = serde_json::json!({
            "prompt": "x",
            "repos": [{"input": {"url": "https://git.example/org/widgets.git"}}]
        });
        let parsed = parse_spec(&spec);
        assert_eq!(parsed.repos[0].name, "widgets");
    }

    #[test]
    fn parse_status_defaults_to_pending() {
        let status = serde_json::json!({});
        let parsed = parse_status(&status);
        assert_eq!(parsed.phase, Phase::Pending);
        assert!(parsed.repos.is_empty());
    }

    #[test]
    fn resolve_repo_name_prefers_spec_name() {
        let mut spec = SessionSpec::default();
        spec.repos.push(RepoSpec {
            input: RepoRef { url: "https://git.example/org/a.git".into(), branch: None },
            output: None,
            name: "custom".into(),
        });
        assert_eq!(resolve_repo_name(&spec, 0), "custom");
    }

    #[test]
    fn resolve_repo_name_falls_back_to_index() {
        let spec = SessionSpec::default();
        assert_eq!(resolve_repo_name(&spec, 3), "repo-3");
    }

    #[test]
    fn upsert_repo_status_is_idempotent_except_timestamp() {
        let mut repos = Vec::new();
        upsert_repo_status(&mut repos, "a", "pushed", "t1");
        upsert_repo_status(&mut repos, "a", "pushed", "t2");
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].status, "pushed");
        assert_eq!(repos[0].last_updated, "t2");
    }

    #[test]
    fn parse_spec_round_trips_through_serialize() {
        let spec = SessionSpec {
            prompt: "hello".into(),
            display_name: "Hello Session".into(),
            timeout: 600,
            interactive: true,
            ..SessionSpec::default()
        };
        let value = serde_json::to_value(&spec).unwrap();
        let reparsed = parse_spec(&value);
        assert_eq!(reparsed, spec);
    }
}
