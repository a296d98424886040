//! Upstream health state machine.
//!
//! # State Transitions
//! ```text
//! Unknown/Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! Unknown/Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Lock-free health record shared between the monitor and the status route.
#[derive(Debug, Default)]
pub struct UpstreamHealth {
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl UpstreamHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Report a successful probe.
    pub fn mark_success(&self, healthy_threshold: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.state() == HealthState::Healthy {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            tracing::info!("Upstream marked healthy");
        }
    }

    /// Report a failed probe.
    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.state() == HealthState::Unhealthy {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            tracing::warn!("Upstream marked unhealthy");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_with_hysteresis() {
        let health = UpstreamHealth::new();
        assert_eq!(health.state(), HealthState::Unknown);

        health.mark_success(1);
        assert_eq!(health.state(), HealthState::Healthy);

        health.mark_failure(2);
        assert_eq!(health.state(), HealthState::Healthy);
        health.mark_failure(2);
        assert_eq!(health.state(), HealthState::Unhealthy);

        health.mark_success(2);
        assert_eq!(health.state(), HealthState::Unhealthy);
        health.mark_success(2);
        assert_eq!(health.state(), HealthState::Healthy);
    }

    #[test]
    fn test_success_resets_failures() {
        let health = UpstreamHealth::new();
        health.mark_failure(2);
        health.mark_success(5);
        health.mark_failure(2);
        assert_eq!(health.state(), HealthState::Unknown);
    }
}
