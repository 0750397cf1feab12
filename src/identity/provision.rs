use std::collections::{BTreeMap, HashSet};

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Patch, PatchParams, PostParams};

use super::error::ProvisionError;
use crate::k8s::{Gateway, GatewayError, gateway::owner_ref_for};
use crate::naming;
use crate::store::session::{API_VERSION, KIND};

/// The exact rule set required by the session's Role (§4.2, §3).
pub fn required_policy_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: Some(vec!["vteam.ambient-code".into()]),
            resources: Some(vec!["agenticsessions".into()]),
            verbs: vec!["get", "list", "watch", "update", "patch"]
                .into_iter()
                .map(String::from)
                .collect(),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["vteam.ambient-code".into()]),
            resources: Some(vec!["agenticsessions/status".into()]),
            verbs: vec!["update".into(), "patch".into()],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["authorization.k8s.io".into()]),
            resources: Some(vec!["selfsubjectaccessreviews".into()]),
            verbs: vec!["create".into()],
            ..Default::default()
        },
    ]
}

fn rule_tuples(rules: &[PolicyRule]) -> HashSet<(String, String, String)> {
    let mut set = HashSet::new();
    for rule in rules {
        for group in rule.api_groups.iter().flatten() {
            for resource in rule.resources.iter().flatten() {
                for verb in &rule.verbs {
                    set.insert((group.clone(), resource.clone(), verb.clone()));
                }
            }
        }
    }
    set
}

/// Whether `existing` already grants every (group, resource, verb) tuple
/// `required` demands.
pub fn satisfies_requirements(existing: &[PolicyRule], required: &[PolicyRule]) -> bool {
    let have = rule_tuples(existing);
    let need = rule_tuples(required);
    need.is_subset(&have)
}

fn owner_refs(session_name: &str, session_uid: &str) -> Vec<OwnerReference> {
    vec![owner_ref_for(API_VERSION, KIND, session_name, session_uid)]
}

fn stage_err(stage: &'static str) -> impl Fn(GatewayError) -> ProvisionError {
    move |source| ProvisionError { stage, source }
}

/// Ensure the ServiceAccount, Role, RoleBinding exist and carry the required
/// rule set, minus token minting — used by `provision` (first call) and by
/// the idempotent repair path invoked on every Start (§4.2 Ensure).
pub async fn ensure(
    gw: &Gateway,
    project: &str,
    session_name: &str,
    session_uid: &str,
) -> Result<(), ProvisionError> {
    let owners = owner_refs(session_name, session_uid);

    let sa_name = naming::service_account(session_name);
    let sa_api = gw.service_accounts(project);
    let sa = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(sa_name.clone()),
            owner_references: Some(owners.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    create_tolerating_exists(&sa_api, &sa).await.map_err(stage_err("service_account"))?;

    let role_name = naming::role(session_name);
    let role_api = gw.roles(project);
    let required_rules = required_policy_rules();
    match role_api.get(&role_name).await {
        Ok(existing) => {
            if !satisfies_requirements(existing.rules.as_deref().unwrap_or(&[]), &required_rules) {
                let mut updated = existing;
                updated.rules = Some(required_rules.clone());
                role_api
                    .replace(&role_name, &PostParams::default(), &updated)
                    .await
                    .map_err(GatewayError::from)
                    .map_err(stage_err("role_update"))?;
            }
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            let role = Role {
                metadata: ObjectMeta {
                    name: Some(role_name.clone()),
                    owner_references: Some(owners.clone()),
                    ..Default::default()
                },
                rules: Some(required_rules.clone()),
            };
            create_tolerating_exists(&role_api, &role)
                .await
                .map_err(stage_err("role_create"))?;
        }
        Err(e) => return Err(stage_err("role_get")(e.into())),
    }

    let rb_name = naming::role_binding(session_name);
    let rb_api = gw.role_bindings(project);
    let rb = RoleBinding {
        metadata: ObjectMeta {
            name: Some(rb_name.clone()),
            owner_references: Some(owners.clone()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".into(),
            kind: "Role".into(),
            name: role_name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".into(),
            name: sa_name.clone(),
            namespace: Some(project.to_owned()),
            ..Default::default()
        }]),
    };
    create_tolerating_exists(&rb_api, &rb).await.map_err(stage_err("role_binding"))?;

    Ok(())
}

async fn create_tolerating_exists<K>(api: &kube::Api<K>, obj: &K) -> Result<(), GatewayError>
where
    K: kube::Resource + Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
    K::DynamicType: Default,
{
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Full provisioning: SA -> Role -> RoleBinding -> Token -> Secret ->
/// annotation patch (§4.2, §5 ordering guarantee). Invoked on create and on
/// every restart.
pub async fn provision(
    gw: &Gateway,
    project: &str,
    session_name: &str,
    session_uid: &str,
    token_ttl_seconds: i64,
) -> Result<(), ProvisionError> {
    ensure(gw, project, session_name, session_uid).await?;

    let sa_name = naming::service_account(session_name);
    let token = gw
        .create_token(project, &sa_name, token_ttl_seconds)
        .await
        .map_err(stage_err("token"))?;

    let secret_name = naming::runner_token_secret(session_name);
    let mut data = BTreeMap::new();
    data.insert("k8s-token".to_owned(), ByteString(token.into_bytes()));
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.clone()),
            owner_references: Some(owner_refs(session_name, session_uid)),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".into()),
        ..Default::default()
    };
    let secret_api = gw.secrets(project);
    match secret_api.get(&secret_name).await {
        Ok(_) => {
            // `ByteString`'s `Serialize` impl base64-encodes, matching the
            // wire format the API server expects for `Secret.data`.
            let patch = serde_json::json!({ "data": secret.data });
            secret_api
                .patch(&secret_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(GatewayError::from)
                .map_err(stage_err("secret_update"))?;
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            create_tolerating_exists(&secret_api, &secret)
                .await
                .map_err(stage_err("secret_create"))?;
        }
        Err(e) => return Err(stage_err("secret_get")(e.into())),
    }

    let annotations = serde_json::json!({
        "metadata": {
            "annotations": {
                "ambient-code.io/runner-sa": sa_name,
                "ambient-code.io/runner-token-secret": secret_name,
            }
        }
    });
    let session_api = gw.dynamic(project, &crate::k8s::resources::agentic_session());
    session_api
        .patch(session_name, &PatchParams::default(), &Patch::Merge(&annotations))
        .await
        .map_err(GatewayError::from)
        .map_err(stage_err("annotation_patch"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rule_set_covers_selfsubjectaccessreviews() {
        let rules = required_policy_rules();
        let tuples = rule_tuples(&rules);
        assert!(tuples.contains(&(
            "authorization.k8s.io".to_owned(),
            "selfsubjectaccessreviews".to_owned(),
            "create".to_owned()
        )));
        assert!(tuples.contains(&(
            "vteam.ambient-code".to_owned(),
            "agenticsessions".to_owned(),
            "update".to_owned()
        )));
        assert!(tuples.contains(&(
            "vteam.ambient-code".to_owned(),
            "agenticsessions/status".to_owned(),
            "patch".to_owned()
        )));
    }

    #[test]
    fn satisfies_requirements_is_false_when_missing_a_verb() {
        let required = required_policy_rules();
        let mut partial = required.clone();
        partial[0].verbs.retain(|v| v != "patch");
        assert!(!satisfies_requirements(&partial, &required));
    }

    #[test]
    fn satisfies_requirements_true_when_superset() {
        let required = required_policy_rules();
        let mut superset = required.clone();
        superset.push(PolicyRule {
            api_groups: Some(vec!["".into()]),
            resources: Some(vec!["pods".into()]),
            verbs: vec!["get".into()],
            ..Default::default()
        });
        assert!(satisfies_requirements(&superset, &required));
    }

    #[test]
    fn satisfies_requirements_is_idempotent_check() {
        let required = required_policy_rules();
        assert!(satisfies_requirements(&required, &required));
    }
}
