use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    /// Image for the temp content pod's "content" container (§4.6).
    pub content_service_image: String,
    /// `Always` or `IfNotPresent`.
    pub image_pull_policy: String,
    /// Default TTL for temp content pods, seconds.
    pub temp_pod_ttl_seconds: i64,
    /// Max age of a runner bearer token before it's considered stale (T_token_max).
    pub token_refresh_max_age_seconds: i64,
    /// Trust `X-Forwarded-User`/`X-Forwarded-Email`/`X-Forwarded-Groups` headers.
    pub trust_proxy_headers: bool,
    /// Janitor sweep interval, seconds; clamped to >= 60 per §4.9.
    pub janitor_interval_seconds: u64,
    /// Timeout for proxied list/read/write/diff calls to the content sidecar.
    pub proxy_timeout_seconds: u64,
}

impl Config {
    pub fn load() -> Self {
        let janitor_interval_seconds = env::var("JANITOR_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60)
            .max(60);

        Self {
            listen: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            content_service_image: env::var("CONTENT_SERVICE_IMAGE")
                .unwrap_or_else(|_| "quay.io/ambient_code/vteam_backend:latest".into()),
            image_pull_policy: env::var("IMAGE_PULL_POLICY").unwrap_or_else(|_| "IfNotPresent".into()),
            temp_pod_ttl_seconds: env::var("TEMP_POD_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            token_refresh_max_age_seconds: env::var("TOKEN_REFRESH_MAX_AGE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            trust_proxy_headers: env::var("TRUST_PROXY_HEADERS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            janitor_interval_seconds,
            proxy_timeout_seconds: env::var("PROXY_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn janitor_interval_has_a_floor() {
        // SAFETY-free: sequential test, no cross-test env races in this module.
        unsafe {
            env::set_var("JANITOR_INTERVAL_SECONDS", "5");
        }
        let cfg = Config::load();
        assert_eq!(cfg.janitor_interval_seconds, 60);
        unsafe {
            env::remove_var("JANITOR_INTERVAL_SECONDS");
        }
    }

    #[test]
    fn defaults_match_spec() {
        unsafe {
            env::remove_var("TEMP_POD_TTL_SECONDS");
            env::remove_var("IMAGE_PULL_POLICY");
            env::remove_var("CONTENT_SERVICE_IMAGE");
        }
        let cfg = Config::load();
        assert_eq!(cfg.temp_pod_ttl_seconds, 900);
        assert_eq!(cfg.content_service_image, "quay.io/ambient_code/vteam_backend:latest");
    }
}
