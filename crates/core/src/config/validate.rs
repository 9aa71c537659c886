use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - URLs are set
/// - At least one target is requested, none empty
/// - Timeouts are not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.index.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "index.url cannot be empty".to_string(),
        ));
    }

    if config.index.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "index.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.runner.dist_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "runner.dist_url cannot be empty".to_string(),
        ));
    }

    if config.runner.binary_name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "runner.binary_name cannot be empty".to_string(),
        ));
    }

    if config.runner.timeout_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "runner.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.bisect.targets.is_empty() {
        return Err(ConfigError::ValidationError(
            "bisect.targets cannot be empty".to_string(),
        ));
    }

    if config.bisect.targets.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::ValidationError(
            "bisect.targets cannot contain an empty target".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_empty_index_url_fails() {
        let mut config = Config::default();
        config.index.url = " ".to_string();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_runner_timeout_fails() {
        let mut config = Config::default();
        config.runner.timeout_secs = Some(0);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("runner.timeout_secs"));
    }

    #[test]
    fn test_validate_empty_targets_fails() {
        let mut config = Config::default();
        config.bisect.targets.clear();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("bisect.targets"));
    }
}
