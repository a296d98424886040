//! Route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::dispatch::AbortOnDrop;
use crate::error::SidecarError;
use crate::health::HealthState;
use crate::http::request::{parse_generate, request_id, GenerateBody};
use crate::http::server::AppState;
use crate::http::stream::ndjson_response;
use crate::upstream::StreamEvent;

#[derive(Debug, Serialize)]
pub struct GenerateReply {
    pub result: String,
    pub model: String,
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct UpstreamStatus {
    pub base_url: String,
    pub healthy: bool,
    pub state: HealthState,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub in_flight: usize,
    pub max_concurrency: Option<usize>,
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub upstream: UpstreamStatus,
    pub in_flight: usize,
    pub oldest_slot_ms: Option<u64>,
    pub models: Vec<ModelStatus>,
}

/// POST /v1/llm/{model}
pub async fn generate(
    State(state): State<AppState>,
    Path(model): Path<String>,
    headers: HeaderMap,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateReply>, SidecarError> {
    let request_id = request_id(&headers);
    let input = parse_generate(body, request_id.clone())?;

    let result = state
        .dispatcher
        .dispatch(&model, &input.prompt, input.options)
        .await?;

    Ok(Json(GenerateReply {
        result,
        model,
        request_id,
    }))
}

/// POST /v1/llm/{model}/stream
///
/// Waits for the first event: a leading error becomes an ordinary error
/// response, anything else starts the chunked body.
pub async fn generate_stream(
    State(state): State<AppState>,
    Path(model): Path<String>,
    headers: HeaderMap,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    let input = match parse_generate(body, request_id(&headers)) {
        Ok(input) => input,
        Err(e) => return e.into_response(),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = state.dispatcher.clone();
    let task = AbortOnDrop(tokio::spawn(async move {
        let mut sink = move |event: StreamEvent| {
            let _ = tx.send(event);
        };
        dispatcher
            .dispatch_stream(&model, &input.prompt, &mut sink, input.options)
            .await
    }));

    match rx.recv().await {
        Some(StreamEvent::Error(e)) => e.into_response(),
        Some(first) => ndjson_response(first, rx, task),
        None => SidecarError::internal("stream terminated unexpectedly", None).into_response(),
    }
}

/// GET /v1/status
pub async fn status(State(state): State<AppState>) -> Json<SystemStatus> {
    let settings = state.dispatcher.settings();
    let slots = state.dispatcher.slots();

    let models = slots
        .snapshot()
        .into_iter()
        .map(|usage| ModelStatus {
            timeout_ms: settings.resolve_timeout(&usage.model, None).as_millis() as u64,
            name: usage.model,
            in_flight: usage.in_flight,
            max_concurrency: usage.max_concurrency,
        })
        .collect();

    let health = state.health.state();
    Json(SystemStatus {
        status: if health == HealthState::Unhealthy { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        upstream: UpstreamStatus {
            base_url: state.upstream_url.clone(),
            healthy: health == HealthState::Healthy,
            state: health,
        },
        in_flight: slots.total_in_flight(),
        oldest_slot_ms: slots.oldest_slot_age().map(|age| age.as_millis() as u64),
        models,
    })
}

/// GET /health
pub async fn liveness() -> &'static str {
    "ok"
}
