//! Wire types for the Ollama-compatible `/api/generate` endpoint.

use serde::{Deserialize, Serialize};

use crate::error::SidecarError;

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
}

/// Non-streaming response body. Only `response` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,

    #[serde(default)]
    pub done: bool,

    #[serde(default)]
    pub eval_count: Option<u32>,
}

/// One NDJSON object from a streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub response: Option<String>,

    #[serde(default)]
    pub done: bool,

    /// Set by the upstream when generation fails mid-stream.
    #[serde(default)]
    pub error: Option<String>,
}

/// Event pushed to a streaming caller.
///
/// A stream delivers any number of `Chunk`s followed by exactly one of
/// `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Done,
    Error(SidecarError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk(_))
    }
}

/// Callback receiving stream events in upstream order.
pub type EventSink<'a> = dyn FnMut(StreamEvent) + Send + 'a;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(GenerateRequest {
            model: "gemma",
            prompt: "hi",
            stream: false,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"model": "gemma", "prompt": "hi", "stream": false}));
    }

    #[test]
    fn test_response_requires_text() {
        let ok: GenerateResponse =
            serde_json::from_str(r#"{"model":"gemma","response":"hello","done":true,"eval_count":3}"#)
                .unwrap();
        assert_eq!(ok.response, "hello");
        assert_eq!(ok.eval_count, Some(3));

        assert!(serde_json::from_str::<GenerateResponse>(r#"{"done":true}"#).is_err());
    }

    #[test]
    fn test_terminal_events() {
        assert!(!StreamEvent::Chunk("a".into()).is_terminal());
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error(SidecarError::Timeout { timeout_ms: 1 }).is_terminal());
    }
}
