//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, tracing)
//!     → request.rs (parse body, validate prompt and timeout)
//!     → handlers.rs (dispatch, status, liveness)
//!         → stream.rs (NDJSON body for streamed generations)
//!     → SidecarError::into_response on failure
//! ```

pub mod handlers;
pub mod request;
pub mod server;
pub mod stream;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
