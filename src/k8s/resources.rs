//! `ApiResource` descriptors for the resource kinds accessed dynamically
//! (no compiled-in CRD schema — see `store::session` for the typed
//! projection layered on top).

use kube::discovery::ApiResource;

/// `vteam.ambient-code/v1alpha1, AgenticSession` — the Session declarative
/// record (§3, §6).
pub fn agentic_session() -> ApiResource {
    ApiResource {
        group: "vteam.ambient-code".into(),
        version: "v1alpha1".into(),
        api_version: "vteam.ambient-code/v1alpha1".into(),
        kind: "AgenticSession".into(),
        plural: "agenticsessions".into(),
    }
}

/// `project.openshift.io/v1, Project` — used to check the
/// `ambient-code.io/managed=true` label on a tenant boundary (§3, §4.8).
pub fn openshift_project() -> ApiResource {
    ApiResource {
        group: "project.openshift.io".into(),
        version: "v1".into(),
        api_version: "project.openshift.io/v1".into(),
        kind: "Project".into(),
        plural: "projects".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agentic_session_gvk() {
        let ar = agentic_session();
        assert_eq!(ar.group, "vteam.ambient-code");
        assert_eq!(ar.version, "v1alpha1");
        assert_eq!(ar.plural, "agenticsessions");
    }

    #[test]
    fn openshift_project_gvk() {
        let ar = openshift_project();
        assert_eq!(ar.api_version, "project.openshift.io/v1");
    }
}
