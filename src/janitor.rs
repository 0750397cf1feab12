//! Background Janitor (§4.9): periodically sweeps every managed project for
//! expired temp content pods (TTL-based, labeled `app=temp-content-service`)
//! and warns on orphaned runner-token Secrets whose Session no longer
//! exists. Runs as a best-effort background task; a single project's
//! failure never stops the sweep of the rest.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::api::{ListParams, PropagationPolicy};

use crate::k8s::Gateway;
use crate::store::project;
use crate::store::AppState;

/// `tokio::select!` loop over a shutdown signal and the sweep interval,
/// mirroring the teacher's reconciler task shape.
pub async fn run(state: AppState, mut shutdown: tokio::sync::watch::Receiver<()>) {
    tracing::info!("janitor started");
    let interval = Duration::from_secs(state.config.janitor_interval_seconds);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("janitor shutting down");
                break;
            }
            () = tokio::time::sleep(interval) => {
                sweep(&state).await;
            }
        }
    }
}

async fn sweep(state: &AppState) {
    let projects = match project::list_managed(&state.backend).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "janitor failed to list managed projects");
            return;
        }
    };

    for ns in &projects {
        if let Err(e) = sweep_temp_content_pods(&state.backend, ns, state.config.temp_pod_ttl_seconds).await {
            tracing::warn!(project = %ns, error = %e, "janitor temp content pod sweep failed");
        }
        if let Err(e) = warn_orphaned_runner_secrets(&state.backend, ns).await {
            tracing::warn!(project = %ns, error = %e, "janitor orphan secret sweep failed");
        }
    }
}

/// Deletes any `temp-content-service` Pod whose `created-at` + `ttl`
/// annotations (set by `content::temp_pod::spawn`, falling back to the
/// janitor's configured default) have elapsed.
async fn sweep_temp_content_pods(
    gw: &Gateway,
    project: &str,
    default_ttl_seconds: i64,
) -> Result<(), crate::k8s::GatewayError> {
    let pods = gw.pods(project);
    let lp = ListParams::default().labels("app=temp-content-service");
    let list = pods.list(&lp).await?;

    let now = Utc::now();
    for pod in list.items {
        let Some(name) = pod.metadata.name.clone() else { continue };
        if is_expired(&pod.metadata.annotations, default_ttl_seconds, now) {
            tracing::info!(project, pod = %name, "janitor deleting expired temp content pod");
            if let Err(e) =
                Gateway::delete_with_propagation(&pods, &name, PropagationPolicy::Foreground).await
            {
                tracing::warn!(project, pod = %name, error = %e, "failed to delete expired temp content pod");
            }
        }
    }
    Ok(())
}

/// Pure predicate, split out for testability: a pod is expired once
/// `created-at + max(ttl, default_ttl_seconds)` is in the past. A pod missing
/// `created-at` is treated as not-yet-expired rather than immediately swept.
fn is_expired(
    annotations: &Option<std::collections::BTreeMap<String, String>>,
    default_ttl_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    let Some(annotations) = annotations else { return false };
    let Some(created_at) = annotations.get("created-at").and_then(|v| DateTime::parse_from_rfc3339(v).ok())
    else {
        return false;
    };
    let ttl_seconds = annotations
        .get("ttl")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default_ttl_seconds);
    now.signed_duration_since(created_at.with_timezone(&Utc)) > chrono::Duration::seconds(ttl_seconds)
}

/// Warns (does not delete — operators may be mid-investigation) on any
/// `ambient-runner-token` Secret whose Session no longer exists.
async fn warn_orphaned_runner_secrets(gw: &Gateway, project: &str) -> Result<(), crate::k8s::GatewayError> {
    let secrets = gw.secrets(project);
    let lp = ListParams::default().labels("app=ambient-runner-token");
    let list = secrets.list(&lp).await?;

    for secret in list.items {
        let Some(secret_name) = secret.metadata.name.clone() else { continue };
        let Some(session_name) = secret_name.strip_prefix("ambient-runner-token-") else { continue };
        let api = gw.dynamic(project, &crate::k8s::resources::agentic_session());
        match api.get(session_name).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {
                tracing::warn!(project, secret = %secret_name, session = %session_name, "orphaned runner token secret: session no longer exists");
            }
            Err(e) => {
                tracing::debug!(project, secret = %secret_name, error = %e, "orphan secret check failed");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn annotations(ttl: Option<&str>, created_at: &str) -> Option<BTreeMap<String, String>> {
        let mut m = BTreeMap::new();
        m.insert("created-at".to_owned(), created_at.to_owned());
        if let Some(ttl) = ttl {
            m.insert("ttl".to_owned(), ttl.to_owned());
        }
        Some(m)
    }

    #[test]
    fn not_expired_within_ttl() {
        let now = Utc::now();
        let created = (now - chrono::Duration::seconds(100)).to_rfc3339();
        let annotations = annotations(Some("900"), &created);
        assert!(!is_expired(&annotations, 900, now));
    }

    #[test]
    fn expired_past_ttl() {
        let now = Utc::now();
        let created = (now - chrono::Duration::seconds(1000)).to_rfc3339();
        let annotations = annotations(Some("900"), &created);
        assert!(is_expired(&annotations, 900, now));
    }

    #[test]
    fn falls_back_to_default_ttl_when_annotation_missing() {
        let now = Utc::now();
        let created = (now - chrono::Duration::seconds(1000)).to_rfc3339();
        let annotations = annotations(None, &created);
        assert!(is_expired(&annotations, 900, now));
    }

    #[test]
    fn missing_created_at_is_not_expired() {
        let now = Utc::now();
        assert!(!is_expired(&None, 900, now));
    }
}
