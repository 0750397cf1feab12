use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::k8s::{CallerIdentity, Gateway};
use crate::store::AppState;

/// Authenticated caller, extracted from forwarding headers and bound to a
/// request-scoped impersonated `Gateway` (§4.8, §9 "Impersonation": handlers
/// must not mix backend and impersonated clients on the same write).
#[derive(Clone)]
pub struct AuthUser {
    pub identity: CallerIdentity,
    pub email: Option<String>,
    pub gateway: Gateway,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = identity_from_headers(&parts.headers, state.config.trust_proxy_headers)?;
        let email = header_str(parts, "x-forwarded-email");
        let gateway = state.backend.impersonating(&identity)?;

        Ok(Self { identity, email, gateway })
    }
}

/// Shared with the Create handler, which writes under the backend identity
/// but still needs the caller's identity for `spec.userContext` and the
/// audit trail (§4.1, §4.3 Create).
pub fn identity_from_headers(
    headers: &axum::http::HeaderMap,
    trust_proxy_headers: bool,
) -> Result<CallerIdentity, ApiError> {
    if !trust_proxy_headers {
        return Err(ApiError::Unauthorized);
    }
    let username = headers
        .get("x-forwarded-user")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or(ApiError::Unauthorized)?;
    let groups = headers
        .get("x-forwarded-groups")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    Ok(CallerIdentity { username, groups })
}

fn header_str(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)?
        .to_str()
        .ok()
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn header_csv(parts: &Parts, name: &str) -> Vec<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Project membership check for clone targets and writes (§4.8, §4.3 Clone).
pub async fn require_managed_project(gw: &Gateway, project: &str) -> Result<(), ApiError> {
    match crate::store::project::is_managed(gw, project).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(ApiError::Forbidden),
        Err(e) if e.is_not_found() => Err(ApiError::Forbidden),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn make_parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/test");
        for &(k, v) in headers {
            builder = builder.header(k, v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn header_str_reads_forwarded_user() {
        let parts = make_parts(&[("x-forwarded-user", "alice")]);
        assert_eq!(header_str(&parts, "x-forwarded-user"), Some("alice".into()));
    }

    #[test]
    fn header_str_missing_is_none() {
        let parts = make_parts(&[]);
        assert_eq!(header_str(&parts, "x-forwarded-user"), None);
    }

    #[test]
    fn header_str_empty_value_is_none() {
        let parts = make_parts(&[("x-forwarded-user", "")]);
        assert_eq!(header_str(&parts, "x-forwarded-user"), None);
    }

    #[test]
    fn header_csv_splits_and_trims() {
        let parts = make_parts(&[("x-forwarded-groups", "devs, admins ,qa")]);
        assert_eq!(header_csv(&parts, "x-forwarded-groups"), vec!["devs", "admins", "qa"]);
    }

    #[test]
    fn header_csv_missing_is_empty() {
        let parts = make_parts(&[]);
        assert!(header_csv(&parts, "x-forwarded-groups").is_empty());
    }
}
