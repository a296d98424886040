//! Configuration loading from disk and environment.

use std::env;
use std::fs;
use std::path::Path;
use crate::config::schema::SidecarConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SidecarConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: SidecarConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build configuration without a file: defaults plus environment overrides.
pub fn load_from_env() -> Result<SidecarConfig, ConfigError> {
    let mut config = SidecarConfig::default();
    apply_env_overrides(&mut config, |key| env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides on top of a parsed config.
///
/// - `HERMES_BIND_ADDRESS` → `server.bind_address`
/// - `OLLAMA_URL` → `upstream.base_url`
/// - `HERMES_DEFAULT_TIMEOUT_MS` → `upstream.default_timeout_ms`
pub fn apply_env_overrides<F>(config: &mut SidecarConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup("HERMES_BIND_ADDRESS") {
        config.server.bind_address = addr;
    }
    if let Some(url) = lookup("OLLAMA_URL") {
        config.upstream.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(raw) = lookup("HERMES_DEFAULT_TIMEOUT_MS") {
        match raw.parse() {
            Ok(ms) => config.upstream.default_timeout_ms = ms,
            Err(_) => tracing::warn!(value = %raw, "Ignoring non-numeric HERMES_DEFAULT_TIMEOUT_MS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [server]
            bind_address = "127.0.0.1:4020"

            [models.gemma]
            max_concurrency = 2
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:4020");
        assert_eq!(config.models["gemma"].max_concurrency, Some(2));
    }

    #[test]
    fn test_invalid_file_reports_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[models.gemma]\nmax_concurrency = 0").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors[0].field, "models.gemma.max_concurrency")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SidecarConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            "OLLAMA_URL" => Some("http://gpu-box:11434/".into()),
            "HERMES_DEFAULT_TIMEOUT_MS" => Some("1500".into()),
            _ => None,
        });
        assert_eq!(config.upstream.base_url, "http://gpu-box:11434");
        assert_eq!(config.upstream.default_timeout_ms, 1500);
        assert_eq!(config.server.bind_address, "0.0.0.0:4020");
    }
}
