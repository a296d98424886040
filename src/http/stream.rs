//! NDJSON response bodies for streamed generations.
//!
//! # Data Flow
//! ```text
//! dispatcher task ──StreamEvent──▶ unbounded channel ──▶ body stream ──▶ client
//!                                                        {"chunk": "..."}
//!                                                        {"done": true}
//!                                                        {"error": ..., "type": ...}
//! ```
//!
//! The body owns the dispatcher task; a client disconnect drops the body,
//! which aborts the task and releases its slot. If the task dies before its
//! terminal event, the body ends with an `internal_error` line instead.

use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;

use crate::dispatch::task::{panic_message, AbortOnDrop};
use crate::error::{SidecarError, SidecarResult};
use crate::upstream::StreamEvent;

pub const NDJSON: &str = "application/x-ndjson";

/// Encode one event as a newline-terminated JSON line.
pub fn encode_event(event: &StreamEvent) -> Bytes {
    let value = match event {
        StreamEvent::Chunk(text) => json!({ "chunk": text }),
        StreamEvent::Done => json!({ "done": true }),
        StreamEvent::Error(err) => err.to_json(),
    };
    let mut line = value.to_string();
    line.push('\n');
    Bytes::from(line)
}

struct BodyState {
    first: Option<StreamEvent>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    finished: bool,
    task: AbortOnDrop<SidecarResult<()>>,
}

/// Build a chunked response that replays `first` and then drains `events`
/// up to and including the terminal event.
pub fn ndjson_response(
    first: StreamEvent,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    task: AbortOnDrop<SidecarResult<()>>,
) -> Response {
    let state = BodyState {
        finished: false,
        first: Some(first),
        events,
        task,
    };

    let body = stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        let event = match state.first.take() {
            Some(event) => event,
            None => match state.events.recv().await {
                Some(event) => event,
                None => StreamEvent::Error(task_failure(&mut state.task).await),
            },
        };
        state.finished = event.is_terminal();
        Some((Ok::<_, Infallible>(encode_event(&event)), state))
    });

    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(body)).into_response()
}

/// Error for a dispatch task whose event channel closed without a terminal event.
async fn task_failure(task: &mut AbortOnDrop<SidecarResult<()>>) -> SidecarError {
    let err = match (&mut task.0).await {
        Ok(Err(e)) => e,
        Ok(Ok(())) => SidecarError::internal("stream terminated unexpectedly", None),
        Err(join_err) if join_err.is_panic() => {
            SidecarError::internal("execution failed", Some(panic_message(join_err.into_panic())))
        }
        Err(join_err) => SidecarError::internal("terminated unexpectedly", Some(join_err.to_string())),
    };
    tracing::error!(error = %err, "Stream ended without a terminal event");
    err
}
