//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, concurrency > 0)
//! - Validate addresses and the upstream URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SidecarConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Usable-but-suspicious configs produce warnings, not errors

use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::SidecarConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `models.gemma.timeout_ms`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &SidecarConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be > 0"));
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("'{}' is not a valid URL: {}", config.upstream.base_url, e),
        )),
    }
    if config.upstream.default_timeout_ms == 0 {
        errors.push(ValidationError::new("upstream.default_timeout_ms", "must be > 0"));
    }
    if config.upstream.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_ms", "must be > 0"));
    }

    for (name, model) in &config.models {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("models", "model name must not be empty"));
        }
        if model.max_concurrency == Some(0) {
            errors.push(ValidationError::new(
                format!("models.{}.max_concurrency", name),
                "must be > 0 (omit for unlimited)",
            ));
        }
        if model.timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                format!("models.{}.timeout_ms", name),
                "must be > 0 (omit for the default)",
            ));
        }
    }

    if config.health.enabled && (config.health.interval_secs == 0 || config.health.timeout_secs == 0) {
        errors.push(ValidationError::new(
            "health",
            "interval_secs and timeout_secs must be > 0 when enabled",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Non-fatal problems worth logging when a config is loaded.
pub fn config_warnings(config: &SidecarConfig) -> Vec<ValidationError> {
    let mut warnings = Vec::new();
    if config.models.is_empty() {
        warnings.push(ValidationError::new(
            "models",
            "no models configured; every generation request will be rejected as model_not_configured",
        ));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ModelConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SidecarConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_model_table_warns() {
        let warnings = config_warnings(&SidecarConfig::default());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "models");

        let mut config = SidecarConfig::default();
        config.models.insert("gemma".into(), ModelConfig::default());
        assert!(config_warnings(&config).is_empty());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SidecarConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.upstream.base_url = "ftp://ollama".into();
        config.upstream.default_timeout_ms = 0;
        config.models.insert(
            "gemma".into(),
            ModelConfig {
                max_concurrency: Some(0),
                timeout_ms: Some(0),
            },
        );

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "upstream.base_url",
                "upstream.default_timeout_ms",
                "models.gemma.max_concurrency",
                "models.gemma.timeout_ms",
            ]
        );
    }

    #[test]
    fn test_unlimited_model_is_valid() {
        let mut config = SidecarConfig::default();
        config.models.insert("llama3".into(), ModelConfig::default());
        assert!(validate_config(&config).is_ok());
    }
}
