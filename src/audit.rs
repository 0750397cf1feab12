//! Structured audit trail. There is no database in this system (§6: all
//! state lives in the cluster's declarative store) so the audit log is a
//! `tracing` event rather than a table insert; a log-shipping pipeline
//! (out of scope) is expected to index on the `audit=true` field.

pub struct AuditEntry<'a> {
    pub actor_name: &'a str,
    pub action: &'a str,
    pub resource: &'a str,
    pub resource_id: &'a str,
    pub project: &'a str,
    pub detail: Option<serde_json::Value>,
}

pub fn write_audit(entry: &AuditEntry<'_>) {
    tracing::info!(
        audit = true,
        actor = entry.actor_name,
        action = entry.action,
        resource = entry.resource,
        resource_id = entry.resource_id,
        project = entry.project,
        detail = entry.detail.as_ref().map(ToString::to_string),
        "audit",
    );
}
