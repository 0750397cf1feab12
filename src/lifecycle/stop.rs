use chrono::Utc;
use kube::api::{Patch, PatchParams, PropagationPolicy};

use super::error::LifecycleError;
use crate::k8s::{Gateway, GatewayError};
use crate::lifecycle::Phase;
use crate::naming;
use crate::store::session;

pub enum StopOutcome {
    Stopped,
    AlreadyDeleted,
}

/// Phases that reject a stop request with 400 (§4.3 Stop — literally as
/// specified; note `Error` is not in this set, so an errored session can
/// still be stopped).
const REJECTED_PHASES: [Phase; 3] = [Phase::Completed, Phase::Failed, Phase::Stopped];

pub fn rejects_stop(phase: Phase) -> bool {
    REJECTED_PHASES.contains(&phase)
}

#[tracing::instrument(skip(gw), fields(%project, %name), err)]
pub async fn stop(gw: &Gateway, project: &str, name: &str) -> Result<StopOutcome, LifecycleError> {
    let current = match session::get(gw, project, name).await {
        Ok(s) => s,
        Err(e) if e.is_not_found() => return Ok(StopOutcome::AlreadyDeleted),
        Err(e) => return Err(e.into()),
    };

    if rejects_stop(current.status.phase) {
        return Err(LifecycleError::BadRequest(format!(
            "cannot stop session in phase {}",
            current.status.phase
        )));
    }

    let job_name = current
        .status
        .job_name
        .clone()
        .unwrap_or_else(|| naming::legacy_runner_job(name));

    // Best-effort: a failure here is logged and non-fatal (§4.3 Failure semantics).
    let jobs = gw.jobs(project);
    if let Err(e) = Gateway::delete_with_propagation(&jobs, &job_name, PropagationPolicy::Foreground).await {
        tracing::warn!(session = %name, error = %e, "job deletion failed during stop");
    }

    let pods = gw.pods(project);
    if let Err(e) = Gateway::delete_collection(&pods, &format!("job-name={job_name}")).await {
        tracing::warn!(session = %name, error = %e, "pod cleanup by job-name failed during stop");
    }
    if let Err(e) = Gateway::delete_collection(&pods, &format!("agentic-session={name}")).await {
        tracing::warn!(session = %name, error = %e, "pod cleanup by agentic-session label failed during stop");
    }

    let mut spec = current.spec.clone();
    spec.interactive = true;
    let patch = serde_json::json!({ "spec": spec });
    let api = gw.dynamic(project, &crate::k8s::resources::agentic_session());
    match api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => return Ok(StopOutcome::AlreadyDeleted),
        Err(e) => return Err(GatewayError::from(e).into()),
    }

    match session::update_status(gw, project, name, |status| {
        status.phase = Phase::Stopped;
        status.completion_time = Some(Utc::now());
        status.message = "Session stopped by user".to_owned();
    })
    .await
    {
        Ok(()) => Ok(StopOutcome::Stopped),
        Err(e) if e.is_not_found() => Ok(StopOutcome::AlreadyDeleted),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_stop_on_completed_failed_stopped() {
        assert!(rejects_stop(Phase::Completed));
        assert!(rejects_stop(Phase::Failed));
        assert!(rejects_stop(Phase::Stopped));
    }

    #[test]
    fn allows_stop_on_error_and_active_phases() {
        assert!(!rejects_stop(Phase::Error));
        assert!(!rejects_stop(Phase::Pending));
        assert!(!rejects_stop(Phase::Creating));
        assert!(!rejects_stop(Phase::Running));
        assert!(!rejects_stop(Phase::Stopping));
    }
}
