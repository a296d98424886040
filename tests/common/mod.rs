//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use hermes::config::ModelConfig;
use hermes::{HttpServer, Shutdown, SidecarConfig};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How long the `slow` model takes to answer.
pub const SLOW_DELAY: Duration = Duration::from_millis(500);

/// Counters kept by the mock upstream.
#[derive(Default)]
pub struct MockStats {
    pub calls: AtomicUsize,
    pub live: AtomicUsize,
    pub peak: AtomicUsize,
}

/// Mock Ollama server. Behavior is keyed on the requested model name:
///
/// - `missing`: 404
/// - `broken`: 500 with body `boom`
/// - `garbage`: 200 with a non-JSON body
/// - `slow`: answers after [`SLOW_DELAY`]
/// - `truncated`: streams chunks but never sends `done`
/// - `hang`: streams one chunk, then holds the body open forever
/// - `choppy`: streams `Hello` and `!` with blank lines, garbage and
///   lines split across writes
/// - anything else: echoes the prompt
pub async fn start_mock_upstream() -> (SocketAddr, Arc<MockStats>) {
    let stats = Arc::new(MockStats::default());
    let app = Router::new()
        .route("/api/generate", post(mock_generate))
        .route("/api/tags", get(|| async { Json(json!({ "models": [] })) }))
        .with_state(stats.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, stats)
}

async fn mock_generate(State(stats): State<Arc<MockStats>>, Json(body): Json<Value>) -> Response {
    stats.calls.fetch_add(1, Ordering::SeqCst);
    let live = stats.live.fetch_add(1, Ordering::SeqCst) + 1;
    stats.peak.fetch_max(live, Ordering::SeqCst);

    let model = body["model"].as_str().unwrap_or_default().to_string();
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    let streaming = body["stream"].as_bool().unwrap_or(false);

    if model == "slow" {
        tokio::time::sleep(SLOW_DELAY).await;
    }

    let response = match model.as_str() {
        "missing" => (StatusCode::NOT_FOUND, "model not found").into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "garbage" => (StatusCode::OK, "<html>not json</html>").into_response(),
        "hang" if streaming => ndjson(
            stream::iter(vec![Ok::<_, Infallible>(
                json!({ "response": "first", "done": false }).to_string() + "\n",
            )])
            .chain(stream::pending()),
        ),
        "choppy" if streaming => ndjson(stream::iter(
            CHOPPY_PIECES
                .iter()
                .map(|piece| Ok::<_, Infallible>(piece.to_string())),
        )),
        _ if streaming => stream_words(&prompt, model != "truncated"),
        _ => Json(json!({
            "model": model,
            "response": format!("echo: {}", prompt),
            "done": true,
            "eval_count": 3
        }))
        .into_response(),
    };

    stats.live.fetch_sub(1, Ordering::SeqCst);
    response
}

/// Body pieces for the `choppy` model, written one at a time.
const CHOPPY_PIECES: [&str; 5] = [
    "\n",
    "{\"response\":\"He",
    "llo\",\"done\":false}\n\n",
    "garbage\n{\"response\":\"!\",\"done\":false}\n",
    "{\"done\":true}",
];

fn ndjson<S>(body: S) -> Response
where
    S: futures_util::Stream<Item = Result<String, Infallible>> + Send + 'static,
{
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response()
}

fn stream_words(prompt: &str, finish: bool) -> Response {
    let mut lines: Vec<String> = prompt
        .split_whitespace()
        .map(|word| json!({ "response": format!("{} ", word), "done": false }).to_string() + "\n")
        .collect();
    if finish {
        lines.push(json!({ "response": "", "done": true }).to_string() + "\n");
    }

    ndjson(stream::iter(lines.into_iter().map(Ok::<_, Infallible>)))
}

/// Sidecar config pointing at `upstream` with a few test models.
pub fn sidecar_config(upstream: SocketAddr) -> SidecarConfig {
    let mut config = SidecarConfig::default();
    config.server.bind_address = "127.0.0.1:0".into();
    config.upstream.base_url = format!("http://{}", upstream);
    config.health.enabled = false;

    for name in ["echo", "missing", "broken", "garbage", "truncated", "hang", "choppy"] {
        config.models.insert(name.into(), ModelConfig::default());
    }
    config.models.insert(
        "slow".into(),
        ModelConfig {
            max_concurrency: Some(1),
            timeout_ms: None,
        },
    );
    config
}

/// Start a sidecar with `config` on an ephemeral port.
pub async fn start_sidecar(config: SidecarConfig) -> (SocketAddr, Shutdown) {
    serve(HttpServer::new(config).unwrap()).await
}

/// Run an already built server on an ephemeral port.
pub async fn serve(server: HttpServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, None, server_shutdown).await;
    });

    (addr, shutdown)
}

/// In-flight count for `model` as reported by `/v1/status`.
pub async fn in_flight(addr: SocketAddr, model: &str) -> u64 {
    let status: Value = client()
        .get(format!("http://{}/v1/status", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    status["models"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["name"] == model)
        .and_then(|m| m["in_flight"].as_u64())
        .unwrap_or(0)
}

/// Client that never pools connections, so a dropped stream really disconnects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
