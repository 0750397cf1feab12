//! Temp Content Pod Manager (§4.6): spawns a short-lived RW-mounted sidecar
//! over a session's workspace PVC for post-completion access, and tears it
//! down again. TTL enforcement itself lives in the Janitor (§4.9).

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PersistentVolumeClaimVolumeSource, Pod, PodSpec,
    Probe, ResourceRequirements, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::PostParams;

use crate::config::Config;
use crate::k8s::gateway::owner_ref_for;
use crate::k8s::{Gateway, GatewayError};
use crate::naming;

pub enum SpawnOutcome {
    /// The pod already existed; `ready` reflects its current `PodReady` condition.
    Exists { ready: bool },
    Creating { pod_name: String },
}

pub struct StatusResult {
    pub phase: String,
    pub ready: bool,
    pub pod_name: String,
    pub created_at: Option<String>,
}

/// `POST spawn-content-pod` (§4.6 Spawn).
#[tracing::instrument(skip(gw, config), fields(%project, %session), err)]
pub async fn spawn(
    gw: &Gateway,
    config: &Config,
    project: &str,
    session: &str,
) -> Result<SpawnOutcome, GatewayError> {
    let pods = gw.pods(project);
    let pod_name = naming::temp_content_pod(session);

    if let Ok(existing) = pods.get(&pod_name).await {
        return Ok(SpawnOutcome::Exists { ready: pod_ready(&existing) });
    }

    let pvc_name = naming::workspace_pvc(session);
    gw.persistent_volume_claims(project)
        .get(&pvc_name)
        .await
        .map_err(|e| match GatewayError::from(e) {
            GatewayError::NotFound(_) => {
                GatewayError::NotFound(format!("workspace PVC {pvc_name} not found"))
            }
            other => other,
        })?;

    let pod = build_pod(config, session, &pod_name, &pvc_name);
    let created = pods.create(&PostParams::default(), &pod).await?;
    let owner = created
        .metadata
        .uid
        .as_deref()
        .map(|uid| owner_ref_for("v1", "Pod", &pod_name, uid));

    let service = build_service(session, owner);
    let services = gw.services(project);
    let service_name = naming::temp_content_service(session);
    match services.create(&PostParams::default(), &service).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 409 => {
            tracing::debug!(session, %service_name, "temp content service already exists");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(SpawnOutcome::Creating { pod_name })
}

/// `GET content-pod-status` (§4.6 Status).
#[tracing::instrument(skip(gw), fields(%project, %session), err)]
pub async fn status(gw: &Gateway, project: &str, session: &str) -> Result<StatusResult, GatewayError> {
    let pod_name = naming::temp_content_pod(session);
    let pod = gw.pods(project).get(&pod_name).await?;
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_owned());
    let created_at = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get("created-at"))
        .cloned();
    Ok(StatusResult {
        phase,
        ready: pod_ready(&pod),
        pod_name,
        created_at,
    })
}

/// `DELETE content-pod` (§4.6 Delete): deleting the Pod is enough; the
/// Service is owner-referenced by the Pod and is garbage-collected.
#[tracing::instrument(skip(gw), fields(%project, %session), err)]
pub async fn delete(gw: &Gateway, project: &str, session: &str) -> Result<(), GatewayError> {
    let pods = gw.pods(project);
    let pod_name = naming::temp_content_pod(session);
    Gateway::delete_with_propagation(&pods, &pod_name, kube::api::PropagationPolicy::Foreground).await
}

fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn build_pod(config: &Config, session: &str, pod_name: &str, pvc_name: &str) -> Pod {
    let labels = crate::k8s::gateway::labels(&[
        ("app", "temp-content-service"),
        ("temp-content-for-session", session),
    ]);
    let mut annotations = BTreeMap::new();
    annotations.insert("ttl".to_owned(), config.temp_pod_ttl_seconds.to_string());
    annotations.insert("created-at".to_owned(), Utc::now().to_rfc3339());

    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name.to_owned()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".into()),
            containers: vec![build_container(config, pvc_name)],
            volumes: Some(vec![Volume {
                name: "workspace".into(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: pvc_name.to_owned(),
                    read_only: Some(false),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_container(config: &Config, _pvc_name: &str) -> Container {
    Container {
        name: "content".into(),
        image: Some(config.content_service_image.clone()),
        image_pull_policy: Some(config.image_pull_policy.clone()),
        env: Some(vec![
            env_var("CONTENT_SERVICE_MODE", "true"),
            env_var("STATE_BASE_DIR", "/workspace"),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("http".into()),
            container_port: 8080,
            ..Default::default()
        }]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/health".into()),
                port: IntOrString::String("http".into()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(2),
            period_seconds: Some(2),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: "workspace".into(),
            mount_path: "/workspace".into(),
            read_only: Some(false),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".into(), Quantity("100m".into())),
                ("memory".into(), Quantity("128Mi".into())),
            ])),
            limits: Some(BTreeMap::from([
                ("cpu".into(), Quantity("500m".into())),
                ("memory".into(), Quantity("512Mi".into())),
            ])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_service(session: &str, owner: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>) -> Service {
    let selector = crate::k8s::gateway::labels(&[("temp-content-for-session", session)]);
    Service {
        metadata: ObjectMeta {
            name: Some(naming::temp_content_service(session)),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                port: 8080,
                target_port: Some(IntOrString::String("http".into())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env_var(name: &str, value: &str) -> k8s_openapi::api::core::v1::EnvVar {
    k8s_openapi::api::core::v1::EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            listen: "0.0.0.0:8080".into(),
            content_service_image: "quay.io/ambient_code/vteam_backend:latest".into(),
            image_pull_policy: "IfNotPresent".into(),
            temp_pod_ttl_seconds: 900,
            token_refresh_max_age_seconds: 3600,
            trust_proxy_headers: true,
            janitor_interval_seconds: 60,
            proxy_timeout_seconds: 4,
        }
    }

    #[test]
    fn build_pod_carries_spec_labels_and_annotations() {
        let pod = build_pod(&test_config(), "s1", "temp-content-s1", "ambient-workspace-s1");
        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("temp-content-service"));
        assert_eq!(labels.get("temp-content-for-session").map(String::as_str), Some("s1"));
        let annotations = pod.metadata.annotations.unwrap();
        assert_eq!(annotations.get("ttl").map(String::as_str), Some("900"));
        assert!(annotations.contains_key("created-at"));
        assert_eq!(pod.spec.as_ref().unwrap().restart_policy.as_deref(), Some("Never"));
    }

    #[test]
    fn build_container_uses_configured_image_and_pull_policy() {
        let container = build_container(&test_config(), "ambient-workspace-s1");
        assert_eq!(container.image.as_deref(), Some("quay.io/ambient_code/vteam_backend:latest"));
        assert_eq!(container.image_pull_policy.as_deref(), Some("IfNotPresent"));
        let requests = container.resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("cpu"), Some(&Quantity("100m".into())));
    }

    #[test]
    fn build_service_selects_by_session_label() {
        let svc = build_service("s1", None);
        let selector = svc.spec.unwrap().selector.unwrap();
        assert_eq!(selector.get("temp-content-for-session").map(String::as_str), Some("s1"));
    }

    #[test]
    fn pod_ready_false_without_conditions() {
        let pod = Pod::default();
        assert!(!pod_ready(&pod));
    }
}
