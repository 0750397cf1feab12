use crate::error::ApiError;

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.len();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

pub fn check_name(value: &str) -> Result<(), ApiError> {
    check_length("name", value, 1, 255)?;
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ApiError::BadRequest(
            "name must contain only alphanumeric characters, hyphens, underscores, or dots".into(),
        ));
    }
    Ok(())
}

pub fn check_url(value: &str) -> Result<(), ApiError> {
    check_length("url", value, 1, 2048)?;
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ApiError::BadRequest(
            "url must use http or https scheme".into(),
        ));
    }
    Ok(())
}

pub fn check_branch_name(value: &str) -> Result<(), ApiError> {
    check_length("branch name", value, 1, 255)?;
    if value.contains("..") || value.contains('\0') {
        return Err(ApiError::BadRequest(
            "branch name must not contain '..' or null bytes".into(),
        ));
    }
    Ok(())
}

/// `spec.prompt`: required, non-empty, bounded to keep Job env/args sane.
pub fn check_prompt(value: &str) -> Result<(), ApiError> {
    check_length("prompt", value, 1, 32_768)
}

/// `spec.llmSettings.temperature`: [0, 2].
pub fn check_temperature(value: f64) -> Result<(), ApiError> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ApiError::BadRequest(
            "llmSettings.temperature must be between 0 and 2".into(),
        ));
    }
    Ok(())
}

/// `spec.llmSettings.maxTokens`: [100, 8000].
pub fn check_max_tokens(value: i64) -> Result<(), ApiError> {
    if !(100..=8000).contains(&value) {
        return Err(ApiError::BadRequest(
            "llmSettings.maxTokens must be between 100 and 8000".into(),
        ));
    }
    Ok(())
}

/// `spec.timeout` seconds: [60, 1800].
pub fn check_timeout(value: i64) -> Result<(), ApiError> {
    if !(60..=1800).contains(&value) {
        return Err(ApiError::BadRequest(
            "timeout must be between 60 and 1800 seconds".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_name() {
        assert!(check_name("foo-bar_123.baz").is_ok());
    }

    #[test]
    fn name_too_long() {
        let long = "a".repeat(256);
        assert!(check_name(&long).is_err());
    }

    #[test]
    fn name_bad_chars() {
        assert!(check_name("foo bar").is_err());
        assert!(check_name("foo/bar").is_err());
    }

    #[test]
    fn branch_name_traversal() {
        assert!(check_branch_name("main").is_ok());
        assert!(check_branch_name("feature/..evil").is_err());
    }

    #[test]
    fn url_requires_scheme() {
        assert!(check_url("https://git.example/org/a.git").is_ok());
        assert!(check_url("git.example/org/a.git").is_err());
    }

    #[test]
    fn prompt_must_be_nonempty() {
        assert!(check_prompt("do X").is_ok());
        assert!(check_prompt("").is_err());
    }

    #[test]
    fn temperature_range() {
        assert!(check_temperature(0.0).is_ok());
        assert!(check_temperature(2.0).is_ok());
        assert!(check_temperature(2.1).is_err());
        assert!(check_temperature(-0.1).is_err());
    }

    #[test]
    fn max_tokens_range() {
        assert!(check_max_tokens(100).is_ok());
        assert!(check_max_tokens(8000).is_ok());
        assert!(check_max_tokens(99).is_err());
        assert!(check_max_tokens(8001).is_err());
    }

    #[test]
    fn timeout_range() {
        assert!(check_timeout(60).is_ok());
        assert!(check_timeout(1800).is_ok());
        assert!(check_timeout(59).is_err());
        assert!(check_timeout(1801).is_err());
    }
}
