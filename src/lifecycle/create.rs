use chrono::Utc;
use kube::api::{DynamicObject, PostParams};
use serde_json::json;

use super::error::LifecycleError;
use crate::identity;
use crate::k8s::resources::agentic_session;
use crate::k8s::{CallerIdentity, Gateway};
use crate::store::session::{self, RepoSpec, SessionSpec};

/// Everything the HTTP handler extracts from the request body before
/// delegating to `create` (§4.3 Create, §4.7 `POST sessions`).
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: Option<String>,
    pub display_name: String,
    pub prompt: String,
    pub llm_model: String,
    pub llm_temperature: Option<f64>,
    pub llm_max_tokens: Option<i64>,
    pub timeout: Option<i64>,
    pub interactive: bool,
    pub auto_push_on_complete: bool,
    pub repos: Vec<RepoSpec>,
    pub main_repo_index: i64,
    pub environment_variables: std::collections::BTreeMap<String, String>,
    pub bot_account: Option<session::BotAccount>,
    pub resource_overrides: Option<session::ResourceOverrides>,
    pub parent_session_id: Option<String>,
}

pub struct CreateResult {
    pub name: String,
    pub uid: String,
}

/// Generate `agentic-session-<unix-ts>` when the caller doesn't specify a name.
fn generate_name() -> String {
    format!("agentic-session-{}", Utc::now().timestamp())
}

#[tracing::instrument(skip(gw, opts, caller), fields(%project), err)]
pub async fn create(
    gw: &Gateway,
    project: &str,
    opts: CreateOptions,
    caller: &CallerIdentity,
    token_ttl_seconds: i64,
) -> Result<CreateResult, LifecycleError> {
    let name = opts.name.unwrap_or_else(generate_name);

    let mut environment_variables = opts.environment_variables;
    let mut annotations = serde_json::Map::new();

    if let Some(parent_id) = &opts.parent_session_id {
        environment_variables.insert("PARENT_SESSION_ID".to_owned(), parent_id.clone());
        annotations.insert(
            "vteam.ambient-code/parent-session-id".into(),
            json!(parent_id),
        );
        // Release the parent's workspace PVC if it still holds a temp pod.
        let pods = gw.pods(project);
        let _ = crate::k8s::Gateway::delete_with_propagation(
            &pods,
            &crate::naming::temp_content_pod(parent_id),
            kube::api::PropagationPolicy::Foreground,
        )
        .await;
    }

    let spec = SessionSpec {
        prompt: opts.prompt,
        display_name: opts.display_name,
        llm_settings: session::LlmSettings {
            model: opts.llm_model,
            temperature: opts.llm_temperature.unwrap_or(0.7),
            max_tokens: opts.llm_max_tokens.unwrap_or(4000),
        },
        timeout: opts.timeout.unwrap_or(300),
        interactive: opts.interactive,
        auto_push_on_complete: opts.auto_push_on_complete,
        repos: opts.repos,
        main_repo_index: opts.main_repo_index,
        environment_variables,
        user_context: session::UserContext {
            user_id: caller.username.clone(),
            display_name: caller.username.clone(),
            groups: caller.groups.clone(),
        },
        bot_account: opts.bot_account,
        resource_overrides: opts.resource_overrides,
    };

    let obj = DynamicObject {
        types: Some(kube::api::TypeMeta {
            api_version: session::API_VERSION.to_owned(),
            kind: session::KIND.to_owned(),
        }),
        metadata: kube_meta(&name, &annotations),
        data: json!({
            "spec": spec,
            "status": {
                "phase": "Pending",
                "message": "",
                "repos": [],
            }
        }),
    };

    let api = gw.dynamic(project, &agentic_session());
    let created = api.create(&PostParams::default(), &obj).await?;

    let uid = created.metadata.uid.clone().unwrap_or_default();

    // Non-fatal: identity provisioning failures are logged and create still
    // succeeds (§7 ProvisionError policy).
    if let Err(err) = identity::provision(gw, project, &name, &uid, token_ttl_seconds).await {
        tracing::error!(session = %name, stage = err.stage, error = %err.source, "identity provisioning failed during create");
    }

    Ok(CreateResult { name, uid })
}

fn kube_meta(
    name: &str,
    annotations: &serde_json::Map<String, serde_json::Value>,
) -> kube::api::ObjectMeta {
    let mut meta = kube::api::ObjectMeta {
        name: Some(name.to_owned()),
        ..Default::default()
    };
    if !annotations.is_empty() {
        meta.annotations = Some(
            annotations
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                .collect(),
        );
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_name_follows_spec_format() {
        let name = generate_name();
        assert!(name.starts_with("agentic-session-"));
        let ts_part = name.strip_prefix("agentic-session-").unwrap();
        assert!(ts_part.parse::<i64>().is_ok());
    }
}
