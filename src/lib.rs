//! Hermes: a local inference sidecar with per-model admission control

pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod slots;
pub mod upstream;

pub use config::schema::SidecarConfig;
pub use dispatch::{DispatchOptions, Dispatcher};
pub use error::{SidecarError, SidecarResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use slots::SlotManager;
