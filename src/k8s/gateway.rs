use std::collections::BTreeMap;

use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, Pod, Secret, ServiceAccount, Service as K8sService,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{
    DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, PropagationPolicy,
};
use kube::discovery::ApiResource;
use kube::{Api, Client, Config};

use super::error::GatewayError;

/// Identity of the authenticated caller, resolved upstream (§4.8). Used to
/// build a server-side-impersonated client so every subsequent call carries
/// `Impersonate-User`/`Impersonate-Group` headers on the caller's behalf.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub username: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// The control plane's own service account identity.
    Backend,
    /// The authenticated caller's identity, via impersonation.
    Impersonated,
}

/// Thin wrapper over a `kube::Client` bound to one of the two client modes.
/// All cluster access in this crate goes through a `Gateway`. The base
/// `Config` is retained so an impersonated client can be derived per
/// request without re-reading the kubeconfig/in-cluster source each time.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_config: Config,
    mode: ClientMode,
}

impl Gateway {
    /// The backend identity: used only where §4.1 requires it (Session
    /// creation, token provisioning).
    pub async fn backend() -> Result<Self, GatewayError> {
        let base_config = Config::infer()
            .await
            .map_err(|e| GatewayError::Other(format!("inferring cluster config: {e}")))?;
        let client = Client::try_from(base_config.clone())
            .map_err(|e| GatewayError::Other(format!("building backend client: {e}")))?;
        Ok(Self {
            client,
            base_config,
            mode: ClientMode::Backend,
        })
    }

    /// A caller-impersonated client cloned from the backend's config, used
    /// for reads and caller-initiated mutations (§4.1, §9 "Impersonation").
    pub fn impersonating(&self, identity: &CallerIdentity) -> Result<Self, GatewayError> {
        let mut config = self.base_config.clone();
        config.auth_info.impersonate = Some(identity.username.clone());
        config.auth_info.impersonate_groups = if identity.groups.is_empty() {
            None
        } else {
            Some(identity.groups.clone())
        };
        let client = Client::try_from(config.clone())
            .map_err(|e| GatewayError::Other(format!("building impersonated client: {e}")))?;
        Ok(Self {
            client,
            base_config: config,
            mode: ClientMode::Impersonated,
        })
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // -- typed accessors ---------------------------------------------------

    pub fn pods(&self, ns: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn services(&self, ns: &str) -> Api<K8sService> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn jobs(&self, ns: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn secrets(&self, ns: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn persistent_volume_claims(&self, ns: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn service_accounts(&self, ns: &str) -> Api<ServiceAccount> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn roles(&self, ns: &str) -> Api<Role> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn role_bindings(&self, ns: &str) -> Api<RoleBinding> {
        Api::namespaced(self.client.clone(), ns)
    }

    /// Untyped accessor for a resource kind addressed by GVK, e.g. the
    /// `AgenticSession` custom resource (§4.1).
    pub fn dynamic(&self, ns: &str, ar: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), ns, ar)
    }

    pub fn cluster_scoped_dynamic(&self, ar: &ApiResource) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), ar)
    }

    // -- operations ----------------------------------------------------

    /// Mint a short-lived bearer token for a ServiceAccount via the
    /// `TokenRequest` subresource (§4.2).
    pub async fn create_token(
        &self,
        ns: &str,
        service_account: &str,
        expiration_seconds: i64,
    ) -> Result<String, GatewayError> {
        let api = self.service_accounts(ns);
        let req = TokenRequest {
            spec: TokenRequestSpec {
                expiration_seconds: Some(expiration_seconds),
                ..Default::default()
            },
            ..Default::default()
        };
        let body = serde_json::to_vec(&req)
            .map_err(|e| GatewayError::Other(format!("encoding TokenRequest: {e}")))?;
        let resp: TokenRequest = api
            .create_subresource("token", service_account, &PostParams::default(), body)
            .await?;
        resp.status
            .map(|s| s.token)
            .ok_or_else(|| GatewayError::Other("TokenRequest response missing status".into()))
    }

    /// Delete with an explicit propagation policy (§4.3 uses both foreground
    /// and background depending on caller).
    pub async fn delete_with_propagation<K>(
        api: &Api<K>,
        name: &str,
        policy: PropagationPolicy,
    ) -> Result<(), GatewayError>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let dp = DeleteParams {
            propagation_policy: Some(policy),
            ..Default::default()
        };
        match api.delete(name, &dp).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a collection matching a label selector, tolerating an already-empty result.
    pub async fn delete_collection<K>(
        api: &Api<K>,
        label_selector: &str,
    ) -> Result<(), GatewayError>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let lp = ListParams::default().labels(label_selector);
        match api.delete_collection(&DeleteParams::default(), &lp).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Server-side apply patch, used for Pod/Service/Job creation so retries
    /// are naturally idempotent.
    pub async fn apply<K>(
        api: &Api<K>,
        name: &str,
        manager: &str,
        obj: &K,
    ) -> Result<K, GatewayError>
    where
        K: kube::Resource + Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let pp = PatchParams::apply(manager).force();
        api.patch(name, &pp, &Patch::Apply(obj))
            .await
            .map_err(Into::into)
    }
}

/// Builds owner references pointing at a Session (or any other resource),
/// centralizing invariant 5 (§3: every auxiliary resource is owned by the
/// Session) instead of reimplementing `controller_owner_ref` per call site.
pub fn owner_ref_for(api_version: &str, kind: &str, name: &str, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: api_version.to_owned(),
        kind: kind.to_owned(),
        name: name.to_owned(),
        uid: uid.to_owned(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_ref_is_controller_and_blocks_deletion() {
        let owner = owner_ref_for(
            "vteam.ambient-code/v1alpha1",
            "AgenticSession",
            "s1",
            "abc-123",
        );
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
        assert_eq!(owner.name, "s1");
    }

    #[test]
    fn labels_builds_btreemap() {
        let m = labels(&[("app", "temp-content-service"), ("temp-content-for-session", "s1")]);
        assert_eq!(m.get("app"), Some(&"temp-content-service".to_string()));
        assert_eq!(m.len(), 2);
    }
}
