//! Request parsing for the generation routes.
//!
//! # Responsibilities
//! - Decode the JSON body, mapping malformed input to `Validation`
//! - Require a non-blank prompt and a positive timeout
//! - Read the request ID set by the request-id layer

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::dispatch::DispatchOptions;
use crate::error::{SidecarError, SidecarResult};

/// Standard request ID header.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Body of `POST /v1/llm/{model}` and its streaming twin.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateBody {
    pub prompt: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default, alias = "timeout_ms")]
    pub timeout: Option<u64>,
}

/// A validated generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateInput {
    pub prompt: String,
    pub options: DispatchOptions,
}

/// Turn the raw extractor result into dispatch input.
pub fn parse_generate(
    body: Result<Json<GenerateBody>, JsonRejection>,
    request_id: String,
) -> SidecarResult<GenerateInput> {
    let Json(body) = body.map_err(|e| SidecarError::validation(format!("Invalid request body: {}", e.body_text())))?;

    let prompt = match body.prompt {
        Some(prompt) if !prompt.trim().is_empty() => prompt,
        _ => return Err(SidecarError::validation("Missing required field: prompt")),
    };
    if body.timeout == Some(0) {
        return Err(SidecarError::validation("timeout must be a positive number of milliseconds"));
    }

    Ok(GenerateInput {
        prompt,
        options: DispatchOptions {
            timeout_ms: body.timeout,
            request_id: Some(request_id),
            ..DispatchOptions::default()
        },
    })
}

/// Request ID from the headers, or a fresh one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn body(prompt: Option<&str>, timeout: Option<u64>) -> Result<Json<GenerateBody>, JsonRejection> {
        Ok(Json(GenerateBody {
            prompt: prompt.map(str::to_string),
            timeout,
        }))
    }

    #[test]
    fn test_valid_body() {
        let input = parse_generate(body(Some("hi"), Some(250)), "req-1".into()).unwrap();
        assert_eq!(input.prompt, "hi");
        assert_eq!(input.options.timeout_ms, Some(250));
        assert_eq!(input.options.request_id.as_deref(), Some("req-1"));
        assert!(!input.options.skip_validation);
    }

    #[test]
    fn test_prompt_required() {
        for prompt in [None, Some(""), Some("   ")] {
            let err = parse_generate(body(prompt, None), "r".into()).unwrap_err();
            assert_eq!(err.kind(), "validation_error");
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = parse_generate(body(Some("hi"), Some(0)), "r".into()).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
    }

    #[test]
    fn test_timeout_alias() {
        let parsed: GenerateBody = serde_json::from_str(r#"{"prompt":"x","timeout_ms":10}"#).unwrap();
        assert_eq!(parsed.timeout, Some(10));
    }

    #[test]
    fn test_request_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers).len(), 36);
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));
        assert_eq!(request_id(&headers), "abc");
    }
}
