use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable prefix; nested keys are split on `__`.
const ENV_PREFIX: &str = "NIGHTLY_BISECT_";

/// Load configuration from an optional file with environment variable
/// overrides. Missing keys take their defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut figment = Figment::new();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: Config = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[index]
url = "http://localhost:8000/index.json"

[bisect]
targets = ["linux-arm64"]
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.index.url, "http://localhost:8000/index.json");
        assert_eq!(config.bisect.targets, vec!["linux-arm64".to_string()]);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[index]
timeout_secs = "soon"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_without_file_uses_defaults() {
        let config = load_config(None).unwrap();
        assert!(!config.runner.binary_name.is_empty());
        assert!(config.bisect.strict_ordering);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[cache]
dir = "/var/cache/bisect"

[runner]
timeout_secs = 120
verify_checksums = false
"#
        )
        .unwrap();

        let config = load_config(Some(temp_file.path())).unwrap();
        assert_eq!(config.cache.dir.to_str().unwrap(), "/var/cache/bisect");
        assert_eq!(config.runner.timeout_secs, Some(120));
        assert!(!config.runner.verify_checksums);
        // Untouched sections keep their defaults.
        assert_eq!(config.index.timeout_secs, 30);
    }
}
