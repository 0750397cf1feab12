use std::future::Future;

use kube::api::{DynamicObject, PostParams};
use serde_json::json;

use super::create::CreateResult;
use super::error::LifecycleError;
use crate::k8s::resources::agentic_session;
use crate::k8s::{Gateway, GatewayError};
use crate::store::project;
use crate::store::session;

const MAX_CLONE_NAME_ATTEMPTS: u32 = 50;

/// Generates a non-colliding clone name: `base`, then `base-duplicate`, then
/// `base-duplicate-<n>` for n >= 2, capped at 50 attempts (§4.3 Clone,
/// testable property 6). `exists` performs the existence check (typically a
/// Get against the target project); a non-NotFound error from `exists`
/// stops the search early and uses the current candidate name best-effort,
/// per spec.
pub async fn generate_clone_name<E, Fut>(
    base: &str,
    mut exists: E,
) -> Result<(String, bool), LifecycleError>
where
    E: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, GatewayError>>,
{
    let mut collided = false;
    for attempt in 0..MAX_CLONE_NAME_ATTEMPTS {
        let candidate = match attempt {
            0 => base.to_owned(),
            1 => format!("{base}-duplicate"),
            n => format!("{base}-duplicate-{n}"),
        };
        match exists(candidate.clone()).await {
            Ok(false) => return Ok((candidate, collided)),
            Ok(true) => collided = true,
            Err(_) => return Ok((candidate, true)),
        }
    }
    Err(LifecycleError::CloneNameExhausted(MAX_CLONE_NAME_ATTEMPTS))
}

/// `POST :session/clone` (§4.3 Clone).
#[tracing::instrument(skip(gw), fields(%source_project, %source_name, %target_project), err)]
pub async fn clone(
    gw: &Gateway,
    source_project: &str,
    source_name: &str,
    target_project: &str,
    requested_name: Option<String>,
) -> Result<CreateResult, LifecycleError> {
    let managed = project::is_managed(gw, target_project).await.unwrap_or(false);
    if !managed {
        return Err(LifecycleError::ProjectNotManaged(target_project.to_owned()));
    }

    let source = session::get(gw, source_project, source_name)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                LifecycleError::NotFound(source_name.to_owned())
            } else {
                e.into()
            }
        })?;

    let base = requested_name.unwrap_or_else(|| source_name.to_owned());
    let target_project_owned = target_project.to_owned();
    let gw_owned = gw.clone();
    let (name, collided) = generate_clone_name(&base, move |candidate| {
        let gw = gw_owned.clone();
        let project = target_project_owned.clone();
        async move {
            match session::get_raw(&gw, &project, &candidate).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e),
            }
        }
    })
    .await?;

    let mut spec = source.spec.clone();
    if collided {
        spec.display_name = format!("{} (Duplicate)", spec.display_name);
    }

    let obj = DynamicObject {
        types: Some(kube::api::TypeMeta {
            api_version: session::API_VERSION.to_owned(),
            kind: session::KIND.to_owned(),
        }),
        metadata: kube::api::ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        data: json!({
            "spec": spec,
            "status": {
                "phase": "Pending",
                "message": "",
                "repos": [],
            }
        }),
    };

    let api = gw.dynamic(target_project, &agentic_session());
    let created = api.create(&PostParams::default(), &obj).await?;
    let uid = created.metadata.uid.clone().unwrap_or_default();

    Ok(CreateResult { name, uid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn no_collision_returns_base_name() {
        let (name, collided) = generate_clone_name("src", |_| async { Ok::<_, GatewayError>(false) })
            .await
            .unwrap();
        assert_eq!(name, "src");
        assert!(!collided);
    }

    #[tokio::test]
    async fn single_collision_appends_duplicate_suffix() {
        let existing: HashSet<String> = ["src".to_owned()].into_iter().collect();
        let (name, collided) = generate_clone_name("src", move |candidate| {
            let exists = existing.contains(&candidate);
            async move { Ok::<_, GatewayError>(exists) }
        })
        .await
        .unwrap();
        assert_eq!(name, "src-duplicate");
        assert!(collided);
    }

    #[tokio::test]
    async fn multiple_collisions_increment_counter() {
        let existing: HashSet<String> = [
            "src".to_owned(),
            "src-duplicate".to_owned(),
            "src-duplicate-2".to_owned(),
        ]
        .into_iter()
        .collect();
        let (name, collided) = generate_clone_name("src", move |candidate| {
            let exists = existing.contains(&candidate);
            async move { Ok::<_, GatewayError>(exists) }
        })
        .await
        .unwrap();
        assert_eq!(name, "src-duplicate-3");
        assert!(collided);
    }

    #[tokio::test]
    async fn exhausting_fifty_attempts_errors() {
        let result = generate_clone_name("src", |_| async { Ok::<_, GatewayError>(true) }).await;
        assert!(matches!(result, Err(LifecycleError::CloneNameExhausted(50))));
    }

    #[tokio::test]
    async fn non_not_found_error_stops_search_best_effort() {
        let calls = Arc::new(Mutex::new(0));
        let calls2 = calls.clone();
        let (name, collided) = generate_clone_name("src", move |_| {
            *calls2.lock().unwrap() += 1;
            async { Err::<bool, GatewayError>(GatewayError::Forbidden("denied".into())) }
        })
        .await
        .unwrap();
        assert_eq!(name, "src");
        assert!(collided);
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
