//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! caller (HTTP layer, tests)
//!     → orchestrator.rs Validating   model in table? else ModelNotConfigured
//!     → orchestrator.rs Admitting    slots.acquire() else ConcurrencyLimit
//!     → orchestrator.rs Executing    upstream call, bounded by timeout + grace
//!     → orchestrator.rs Completed    slot released, result returned
//! ```
//!
//! # Design Decisions
//! - No retries at any layer; every failure is surfaced once
//! - Collaborators are injected (`SlotManager`, `Generator`) so tests can
//!   substitute doubles
//! - Timeout precedence: request option, then model, then process default

pub mod options;
pub mod orchestrator;
pub mod task;

pub use options::{DispatchOptions, DispatchRequest, DispatchSettings, Phase};
pub use orchestrator::Dispatcher;
pub use task::AbortOnDrop;
