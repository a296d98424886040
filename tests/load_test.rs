//! Concurrent admission under load.

use reqwest::StatusCode;
use serde_json::json;
use std::sync::atomic::Ordering;

mod common;

#[tokio::test]
async fn test_bounded_model_never_exceeds_limit() {
    let (upstream, stats) = common::start_mock_upstream().await;
    let mut config = common::sidecar_config(upstream);
    config.models.insert(
        "echo".into(),
        hermes::config::ModelConfig {
            max_concurrency: Some(4),
            timeout_ms: None,
        },
    );
    let (addr, shutdown) = common::start_sidecar(config).await;
    let client = common::client();

    let concurrency = 32;
    let mut tasks = Vec::with_capacity(concurrency);
    for i in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}/v1/llm/echo", addr);
        tasks.push(tokio::spawn(async move {
            client
                .post(url)
                .json(&json!({ "prompt": format!("request {}", i) }))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => rejected += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(ok + rejected, concurrency);
    assert!(ok >= 1);
    assert!(stats.peak.load(Ordering::SeqCst) <= 4);

    let status: serde_json::Value = client
        .get(format!("http://{}/v1/status", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let echo = status["models"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["name"] == "echo")
        .unwrap();
    assert_eq!(echo["in_flight"], 0);

    shutdown.trigger();
}
