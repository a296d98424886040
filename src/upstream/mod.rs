//! Upstream (generation backend) subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher
//!     → client.rs POST {base_url}/api/generate {model, prompt, stream}
//!         stream:false → types.rs GenerateResponse → text
//!         stream:true  → ndjson.rs LineBuffer → parse_line → StreamEvent callback
//!     → status / transport failure mapped to SidecarError
//! ```

pub mod client;
pub mod ndjson;
pub mod types;

pub use client::{Generator, OllamaClient};
pub use types::{EventSink, StreamEvent};
