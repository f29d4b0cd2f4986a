//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ApiConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ApiConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ApiConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_config(
            r#"
            [limiter]
            enabled = true
            burst = 10
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert!(config.limiter.enabled);
        assert_eq!(config.limiter.burst, 10);
        assert_eq!(config.limiter.requests_per_second, 2.0);
        assert_eq!(config.shutdown.drain_timeout_secs, 20);
    }

    #[test]
    fn seed_principals_are_parsed() {
        let file = write_config(
            r#"
            [[auth.seed]]
            id = 1
            activated = true
            permissions = ["movies:read", "movies:write"]
            token = "ABCDEFGHIJKLMNOPQRSTUVWXYZ"
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.auth.seed.len(), 1);
        assert_eq!(config.auth.seed[0].ttl_hours, 24);
        assert_eq!(config.auth.seed[0].permissions.len(), 2);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let file = write_config(
            r#"
            [shutdown]
            drain_timeout_secs = 0
            "#,
        );

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors[0].field, "shutdown.drain_timeout_secs")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let file = write_config("[limiter\nburst = 1");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }
}
