//! Project membership: a Project is a namespace labeled
//! `ambient-code.io/managed=true` (§3). Only managed namespaces are
//! eligible as clone targets or session hosts (§4.8, §4.3 Clone).

use crate::k8s::resources::openshift_project;
use crate::k8s::{Gateway, GatewayError};

pub const MANAGED_LABEL: &str = "ambient-code.io/managed";

/// Returns `Ok(true)` if the project exists and carries the managed label
/// with value `"true"`; `Ok(false)` if it exists but isn't managed;
/// propagates `NotFound` so callers can distinguish "absent" from
/// "present but unmanaged".
pub async fn is_managed(gw: &Gateway, project: &str) -> Result<bool, GatewayError> {
    let api = gw.cluster_scoped_dynamic(&openshift_project());
    let obj = api.get(project).await?;
    let managed = obj
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(MANAGED_LABEL))
        .is_some_and(|v| v == "true");
    Ok(managed)
}

/// All managed namespace names, for the Janitor's cross-project sweep (§4.9).
pub async fn list_managed(gw: &Gateway) -> Result<Vec<String>, GatewayError> {
    let api = gw.cluster_scoped_dynamic(&openshift_project());
    let lp = kube::api::ListParams::default().labels(&format!("{MANAGED_LABEL}=true"));
    let list = api.list(&lp).await?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|obj| obj.metadata.name)
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    fn labels_with(managed: &str) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert(super::MANAGED_LABEL.to_owned(), managed.to_owned());
        m
    }

    #[test]
    fn managed_label_constant_matches_spec() {
        assert_eq!(super::MANAGED_LABEL, "ambient-code.io/managed");
    }

    #[test]
    fn label_map_lookup_is_case_sensitive() {
        let labels = labels_with("true");
        assert_eq!(labels.get(super::MANAGED_LABEL).map(String::as_str), Some("true"));
    }
}
