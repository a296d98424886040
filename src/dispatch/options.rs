//! Per-request options, the resolved request value and timeout resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{ModelConfig, SidecarConfig};

/// Caller-supplied knobs for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Explicit timeout in milliseconds; wins over model and process defaults.
    pub timeout_ms: Option<u64>,

    /// Trace identifier; generated when absent.
    pub request_id: Option<String>,

    /// Accept models missing from the model table. Test use only.
    pub skip_validation: bool,

    /// Do not take a slot. Test use only.
    pub skip_concurrency: bool,
}

impl DispatchOptions {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// A validated request on its way to the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub model: String,
    pub prompt: String,
    pub timeout: Duration,
    pub request_id: String,
}

impl DispatchRequest {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// The hot-swappable part of the configuration the dispatcher reads per request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub models: BTreeMap<String, ModelConfig>,
    pub default_timeout: Duration,
    pub grace_period: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &SidecarConfig) -> Self {
        Self {
            models: config.models.clone(),
            default_timeout: config.upstream.default_timeout(),
            grace_period: config.upstream.grace_period(),
        }
    }

    pub fn known_models(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// `explicit ?? model timeout ?? process default`.
    pub fn resolve_timeout(&self, model: &str, explicit_ms: Option<u64>) -> Duration {
        explicit_ms
            .or_else(|| self.models.get(model).and_then(|cfg| cfg.timeout_ms))
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }
}

/// Request lifecycle inside the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    Admitting,
    Executing,
    Completed,
    Rejected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Validating => "validating",
            Phase::Admitting => "admitting",
            Phase::Executing => "executing",
            Phase::Completed => "completed",
            Phase::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

pub(crate) fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
