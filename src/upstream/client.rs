//! HTTP client for the generation backend.
//!
//! # Responsibilities
//! - Issue single-shot and streaming `POST /api/generate` calls
//! - Enforce the per-call timeout
//! - Map upstream statuses and transport faults onto `SidecarError`
//! - Deliver streamed chunks in order, then exactly one terminal event

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::UpstreamConfig;
use crate::error::{SidecarError, SidecarResult};
use crate::observability::metrics;
use crate::upstream::ndjson::{parse_line, LineBuffer, StreamLine};
use crate::upstream::types::{EventSink, GenerateRequest, GenerateResponse, StreamEvent};

/// The work side of a dispatch: anything that can turn a prompt into text.
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    /// Single-shot generation.
    async fn generate(&self, model: &str, prompt: &str, timeout: Duration) -> SidecarResult<String>;

    /// Streamed generation. Chunks go to `on_event` in arrival order, followed by
    /// exactly one `Done` (when returning `Ok`) or `Error` (when returning `Err`).
    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
        on_event: &mut EventSink<'_>,
    ) -> SidecarResult<()>;
}

/// Progress after handling one stream line.
enum Flow {
    Continue,
    Finished,
}

/// Client for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    generate_url: String,
}

impl OllamaClient {
    pub fn new(config: &UpstreamConfig) -> SidecarResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| SidecarError::internal("failed to build HTTP client", Some(e.to_string())))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        tracing::info!(url = %base_url, "Upstream client created");

        Ok(Self {
            generate_url: format!("{}/api/generate", base_url),
            base_url,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lightweight liveness probe (`GET /api/tags`).
    pub async fn ping(&self, timeout: Duration) -> SidecarResult<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e, timeout))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SidecarError::Upstream {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn generate_once(&self, model: &str, prompt: &str, timeout: Duration) -> SidecarResult<String> {
        let response = self
            .client
            .post(&self.generate_url)
            .timeout(timeout)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e, timeout))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(model, status, body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e, timeout))?;
        let parsed: GenerateResponse = serde_json::from_slice(&bytes).map_err(|e| {
            SidecarError::internal("invalid upstream response format", Some(e.to_string()))
        })?;

        debug!(tokens = ?parsed.eval_count, done = parsed.done, "Generate complete");
        Ok(parsed.response)
    }

    #[instrument(skip(self, prompt, on_event), fields(prompt_len = prompt.len()))]
    async fn stream_body(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
        on_event: &mut EventSink<'_>,
    ) -> SidecarResult<()> {
        let response = self
            .client
            .post(&self.generate_url)
            .timeout(timeout)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e, timeout))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(model, status, body));
        }

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut chunks = 0usize;

        while let Some(piece) = body.next().await {
            let piece = piece.map_err(|e| self.transport_error(e, timeout))?;
            let complete = lines.push(&piece).map_err(|e| {
                warn!(error = %e, "Upstream stream line too long");
                SidecarError::internal("invalid upstream response format", Some(e.to_string()))
            })?;
            for line in complete {
                if let Flow::Finished = handle_line(&line, on_event, &mut chunks)? {
                    debug!(chunks, "Stream complete");
                    return Ok(());
                }
            }
        }

        // Body ended; the last line may lack its newline.
        if let Some(line) = lines.finish() {
            if let Flow::Finished = handle_line(&line, on_event, &mut chunks)? {
                debug!(chunks, "Stream complete");
                return Ok(());
            }
        }

        warn!(chunks, "Upstream closed stream without a done marker");
        Err(SidecarError::Upstream {
            status: StatusCode::OK.as_u16(),
            body: "stream ended before completion".to_string(),
        })
    }

    fn status_error(&self, model: &str, status: StatusCode, body: String) -> SidecarError {
        let err = if status == StatusCode::NOT_FOUND {
            SidecarError::ModelNotFound {
                model: model.to_string(),
            }
        } else {
            SidecarError::Upstream {
                status: status.as_u16(),
                body,
            }
        };
        warn!(status = %status, error = %err, "Upstream returned error status");
        metrics::record_upstream_error(err.kind());
        err
    }

    fn transport_error(&self, e: reqwest::Error, timeout: Duration) -> SidecarError {
        let err = if e.is_timeout() {
            SidecarError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            SidecarError::internal("invalid upstream response format", Some(e.to_string()))
        } else {
            SidecarError::Connection {
                url: self.generate_url.clone(),
                reason: root_cause(&e),
            }
        };
        warn!(error = %err, "Upstream transport failure");
        metrics::record_upstream_error(err.kind());
        err
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, model: &str, prompt: &str, timeout: Duration) -> SidecarResult<String> {
        self.generate_once(model, prompt, timeout).await
    }

    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
        on_event: &mut EventSink<'_>,
    ) -> SidecarResult<()> {
        let result = self.stream_body(model, prompt, timeout, on_event).await;
        match &result {
            Ok(()) => on_event(StreamEvent::Done),
            Err(e) => on_event(StreamEvent::Error(e.clone())),
        }
        result
    }
}

fn handle_line(line: &[u8], on_event: &mut EventSink<'_>, chunks: &mut usize) -> SidecarResult<Flow> {
    match parse_line(line) {
        Some(StreamLine::Chunk(text)) => {
            *chunks += 1;
            on_event(StreamEvent::Chunk(text));
            Ok(Flow::Continue)
        }
        Some(StreamLine::Done(tail)) => {
            if let Some(text) = tail {
                *chunks += 1;
                on_event(StreamEvent::Chunk(text));
            }
            Ok(Flow::Finished)
        }
        Some(StreamLine::Failed(message)) => Err(SidecarError::Upstream {
            status: StatusCode::OK.as_u16(),
            body: message,
        }),
        None => Ok(Flow::Continue),
    }
}

/// Innermost error message, which is where reqwest keeps "connection refused" and friends.
fn root_cause(e: &reqwest::Error) -> String {
    let mut source: &dyn std::error::Error = e;
    while let Some(next) = source.source() {
        source = next;
    }
    source.to_string()
}
