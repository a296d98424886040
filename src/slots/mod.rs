//! Slot management subsystem (per-model admission control).
//!
//! # Data Flow
//! ```text
//! dispatcher
//!     → manager.rs acquire(model, owner)
//!         limit reached  → ConcurrencyLimit (no queuing)
//!         space          → count += 1, SlotGuard returned
//!     → guard.rs held for the lifetime of the request
//!         drop / release → count -= 1
//!         panic / abort  → drop runs, count -= 1
//! ```
//!
//! # Design Decisions
//! - Single mutex around counts, limits and slot records (one mutation point)
//! - DashMap mirror of counts for reads that never take that mutex
//! - Owner termination detected by guard drop instead of a monitor task

pub mod guard;
pub mod manager;

pub use guard::SlotGuard;
pub use manager::{SlotError, SlotManager, SlotToken, SlotUsage};
