//! Canonical resource names derived from a session name (§3). Centralized so
//! every component agrees on them instead of reimplementing `fmt!` calls.

pub fn service_account(session: &str) -> String {
    format!("ambient-session-{session}")
}

pub fn role(session: &str) -> String {
    format!("ambient-session-{session}-role")
}

pub fn role_binding(session: &str) -> String {
    format!("ambient-session-{session}-rb")
}

pub fn runner_token_secret(session: &str) -> String {
    format!("ambient-runner-token-{session}")
}

pub fn workspace_pvc(session: &str) -> String {
    format!("ambient-workspace-{session}")
}

/// Canonical Job name. Unified per DESIGN.md's resolution of the spec's Open
/// Question on `ambient-runner-<session>` vs `<session>-job` — this is the
/// only name ever written; `legacy_job_name` is accepted only on read.
pub fn runner_job(session: &str) -> String {
    format!("ambient-runner-{session}")
}

/// Legacy fallback job name, read-only (never written).
pub fn legacy_runner_job(session: &str) -> String {
    format!("{session}-job")
}

pub fn temp_content_pod(session: &str) -> String {
    format!("temp-content-{session}")
}

pub fn temp_content_service(session: &str) -> String {
    format!("temp-content-{session}")
}

pub fn ambient_content_service(session: &str) -> String {
    format!("ambient-content-{session}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_spec_conventions() {
        assert_eq!(service_account("s1"), "ambient-session-s1");
        assert_eq!(role("s1"), "ambient-session-s1-role");
        assert_eq!(role_binding("s1"), "ambient-session-s1-rb");
        assert_eq!(runner_token_secret("s1"), "ambient-runner-token-s1");
        assert_eq!(workspace_pvc("s1"), "ambient-workspace-s1");
        assert_eq!(runner_job("s1"), "ambient-runner-s1");
        assert_eq!(legacy_runner_job("s1"), "s1-job");
        assert_eq!(temp_content_pod("s1"), "temp-content-s1");
        assert_eq!(ambient_content_service("s1"), "ambient-content-s1");
    }
}
