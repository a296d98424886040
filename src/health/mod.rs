//! Upstream health subsystem.
//!
//! # Data Flow
//! ```text
//! Active probing (active.rs):
//!     Periodic timer
//!     → GET {base_url}/api/tags
//!     → Update state.rs
//!
//! State machine (state.rs):
//!     Unknown → Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Informational only: dispatch never consults health state
//! - State transitions require consecutive successes/failures

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthState, UpstreamHealth};
