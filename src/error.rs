//! Error taxonomy shared by the dispatcher, the slot manager and the upstream client.
//!
//! # Responsibilities
//! - Closed set of error kinds, each with exactly one HTTP status
//! - Human-readable message per kind (via `Display`)
//! - Structured JSON record for transport (`to_json`)
//! - Best-effort parsing of legacy string errors
//!
//! # Status Mapping
//! ```text
//! Validation          → 400
//! ModelNotConfigured  → 404
//! ModelNotFound       → 404
//! ConcurrencyLimit    → 429
//! Timeout             → 408
//! Internal            → 500
//! Upstream            → 502
//! Connection          → 503
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced by the request admission and dispatch path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SidecarError {
    /// Malformed caller input.
    #[error("{message}")]
    Validation { message: String },

    /// Model is not known to this sidecar.
    #[error("Model '{model}' is not configured")]
    ModelNotConfigured {
        model: String,
        known_models: Vec<String>,
    },

    /// Model is not loaded or pulled on the upstream.
    #[error("Model '{model}' not found upstream")]
    ModelNotFound { model: String },

    /// Model is at its concurrency ceiling.
    #[error("Model '{model}' is at capacity ({current}/{max_concurrency} requests in flight)")]
    ConcurrencyLimit {
        model: String,
        max_concurrency: usize,
        current: usize,
    },

    /// Execution exceeded its allotted time.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Unexpected local fault.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        cause: Option<String>,
    },

    /// Upstream answered with an error status.
    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Upstream could not be reached.
    #[error("Failed to reach upstream at {url}: {reason}")]
    Connection { url: String, reason: String },
}

/// Result alias for dispatch operations.
pub type SidecarResult<T> = Result<T, SidecarError>;

impl SidecarError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>, cause: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            cause,
        }
    }

    /// HTTP status for this error kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::ModelNotConfigured { .. } => StatusCode::NOT_FOUND,
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ConcurrencyLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Taxonomy name, used as the `type` field on the wire and as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::ModelNotConfigured { .. } => "model_not_configured",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::ConcurrencyLimit { .. } => "concurrency_limit",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Connection { .. } => "connection_error",
        }
    }

    /// Structured record: `error`, `type` and the kind-specific fields.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": self.to_string(),
            "type": self.kind(),
        });

        let extra = match self {
            Self::Validation { .. } => json!({}),
            Self::ModelNotConfigured {
                model,
                known_models,
            } => json!({ "model": model, "known_models": known_models }),
            Self::ModelNotFound { model } => json!({ "model": model }),
            Self::ConcurrencyLimit {
                model,
                max_concurrency,
                current,
            } => json!({
                "model": model,
                "max_concurrency": max_concurrency,
                "current": current,
            }),
            Self::Timeout { timeout_ms } => json!({ "timeout_ms": timeout_ms }),
            Self::Internal { cause, .. } => match cause {
                Some(cause) => json!({ "cause": cause }),
                None => json!({}),
            },
            Self::Upstream { status, body } => json!({
                "upstream_status": status,
                "upstream_body": body,
            }),
            Self::Connection { url, reason } => json!({ "url": url, "reason": reason }),
        };

        if let (Value::Object(target), Value::Object(fields)) = (&mut body, extra) {
            target.extend(fields);
        }
        body
    }

    /// Rebuild a structured error from a legacy string error.
    ///
    /// Recognised prefixes: `HTTP 404`, `HTTP <status>`, `Request timeout after <N>ms`
    /// and `Request failed: <reason>`. Anything else becomes `Internal`.
    pub fn from_legacy(message: &str, model: &str, url: &str) -> Self {
        let message = message.trim();

        if let Some(rest) = message.strip_prefix("HTTP ") {
            let code: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(status) = code.parse::<u16>() {
                if status == 404 {
                    return Self::ModelNotFound {
                        model: model.to_string(),
                    };
                }
                if (400..600).contains(&status) {
                    let body = rest[code.len()..]
                        .trim_start_matches([':', ' ', '-'])
                        .to_string();
                    return Self::Upstream { status, body };
                }
            }
        }

        if let Some(rest) = message.strip_prefix("Request timeout after ") {
            if let Ok(timeout_ms) = rest.trim_end_matches("ms").trim().parse::<u64>() {
                return Self::Timeout { timeout_ms };
            }
        }

        if let Some(reason) = message.strip_prefix("Request failed: ") {
            return Self::Connection {
                url: url.to_string(),
                reason: reason.to_string(),
            };
        }

        Self::internal(message, None)
    }
}

impl IntoResponse for SidecarError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
