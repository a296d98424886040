//! Per-model slot registry.
//!
//! # Responsibilities
//! - Track live slots per model against the configured ceiling
//! - Grant or reject admission immediately (no queuing)
//! - Release slots by token, reporting unknown tokens
//! - Serve in-flight counts without touching the mutation lock

use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ModelConfig;
use crate::error::SidecarError;
use crate::observability::metrics;
use crate::slots::guard::SlotGuard;

/// Opaque handle for one admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotToken(Uuid);

impl SlotToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors from explicit slot release.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// Token was never issued or has already been released.
    #[error("Slot {0} not found")]
    NotFound(SlotToken),
}

/// Full record of a live slot.
#[derive(Debug, Clone)]
struct SlotRecord {
    model: String,
    owner: String,
    acquired_at: Instant,
}

/// State behind the single mutation point.
#[derive(Debug, Default)]
struct Registry {
    /// Configured ceilings; `None` means unlimited.
    limits: HashMap<String, Option<usize>>,
    /// Authoritative live-slot counts.
    counts: HashMap<String, usize>,
    slots: HashMap<SlotToken, SlotRecord>,
}

/// Point-in-time usage of one model.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SlotUsage {
    pub model: String,
    pub in_flight: usize,
    pub max_concurrency: Option<usize>,
}

/// Admission control keyed by model name.
#[derive(Debug, Default)]
pub struct SlotManager {
    registry: Mutex<Registry>,
    /// Read-side mirror of `Registry::counts`, written only under the registry lock.
    in_flight: DashMap<String, usize>,
}

impl SlotManager {
    /// Create a manager with every configured model pre-registered at count 0.
    pub fn new(models: &BTreeMap<String, ModelConfig>) -> Arc<Self> {
        let manager = Arc::new(Self::default());
        manager.configure(models);
        manager
    }

    /// Install (or replace) the per-model limits.
    ///
    /// Live slots are kept; a lowered limit only affects the next `acquire`.
    /// Models dropped from the table stay listed until their last slot is released.
    pub fn configure(&self, models: &BTreeMap<String, ModelConfig>) {
        let mut registry = self.lock();
        registry.limits = models
            .iter()
            .map(|(name, cfg)| (name.clone(), cfg.max_concurrency))
            .collect();

        registry
            .counts
            .retain(|name, count| *count > 0 || models.contains_key(name));
        self.in_flight
            .retain(|name, count| *count > 0 || models.contains_key(name));

        for name in models.keys() {
            registry.counts.entry(name.clone()).or_insert(0);
            self.in_flight.entry(name.clone()).or_insert(0);
        }

        tracing::debug!(models = models.len(), "Slot limits configured");
    }

    /// Try to admit one request for `model` on behalf of `owner`.
    ///
    /// Models without a configured limit are always admitted. The returned
    /// guard releases the slot when dropped, including on panic or task abort.
    pub fn acquire(self: &Arc<Self>, model: &str, owner: &str) -> Result<SlotGuard, SidecarError> {
        let token = {
            let mut registry = self.lock();
            let limit = registry.limits.get(model).copied().flatten();
            let current = registry.counts.get(model).copied().unwrap_or(0);

            if let Some(max_concurrency) = limit {
                if current >= max_concurrency {
                    drop(registry);
                    tracing::warn!(
                        model = %model,
                        owner = %owner,
                        current,
                        max_concurrency,
                        "Concurrency limit reached"
                    );
                    metrics::record_slot_rejection(model);
                    return Err(SidecarError::ConcurrencyLimit {
                        model: model.to_string(),
                        max_concurrency,
                        current,
                    });
                }
            }

            let token = SlotToken::new();
            registry.slots.insert(
                token,
                SlotRecord {
                    model: model.to_string(),
                    owner: owner.to_string(),
                    acquired_at: Instant::now(),
                },
            );
            let count = current + 1;
            registry.counts.insert(model.to_string(), count);
            self.in_flight.insert(model.to_string(), count);
            metrics::set_slots_in_flight(model, count);

            tracing::debug!(model = %model, owner = %owner, slot = %token, in_flight = count, "Slot acquired");
            token
        };

        Ok(SlotGuard::new(self.clone(), token, model.to_string()))
    }

    /// Release a slot by token.
    pub fn release(&self, token: SlotToken) -> Result<(), SlotError> {
        let (record, count) = {
            let mut registry = self.lock();
            let record = registry.slots.remove(&token).ok_or(SlotError::NotFound(token))?;
            let count = match registry.counts.get_mut(&record.model) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count
                }
                None => 0,
            };
            self.in_flight.insert(record.model.clone(), count);
            (record, count)
        };

        metrics::set_slots_in_flight(&record.model, count);
        tracing::debug!(
            model = %record.model,
            owner = %record.owner,
            slot = %token,
            held = ?record.acquired_at.elapsed(),
            in_flight = count,
            "Slot released"
        );
        Ok(())
    }

    /// Snapshot of live slots for `model` (0 for unknown models).
    pub fn current_count(&self, model: &str) -> usize {
        self.in_flight.get(model).map(|r| *r.value()).unwrap_or(0)
    }

    /// Total live slots across all models.
    pub fn total_in_flight(&self) -> usize {
        self.in_flight.iter().map(|r| *r.value()).sum()
    }

    /// Usage of every configured model, plus removed models that still hold
    /// slots, sorted by name.
    pub fn snapshot(&self) -> Vec<SlotUsage> {
        let registry = self.lock();
        let mut usage: Vec<SlotUsage> = registry
            .counts
            .iter()
            .map(|(model, &in_flight)| SlotUsage {
                model: model.clone(),
                in_flight,
                max_concurrency: registry.limits.get(model).copied().flatten(),
            })
            .collect();
        usage.sort_by(|a, b| a.model.cmp(&b.model));
        usage
    }

    /// Age of the oldest live slot, for diagnostics.
    pub fn oldest_slot_age(&self) -> Option<Duration> {
        self.lock()
            .slots
            .values()
            .map(|record| record.acquired_at.elapsed())
            .max()
    }

    // Slot release runs from `Drop`, so a poisoned lock is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(entries: &[(&str, Option<usize>)]) -> BTreeMap<String, ModelConfig> {
        entries
            .iter()
            .map(|(name, max)| {
                (
                    name.to_string(),
                    ModelConfig {
                        max_concurrency: *max,
                        timeout_ms: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_preregisters_models() {
        let manager = SlotManager::new(&models(&[("gemma", Some(2)), ("llama3", None)]));
        assert_eq!(manager.current_count("gemma"), 0);
        assert_eq!(manager.current_count("unknown"), 0);
        assert_eq!(
            manager.snapshot(),
            vec![
                SlotUsage {
                    model: "gemma".into(),
                    in_flight: 0,
                    max_concurrency: Some(2),
                },
                SlotUsage {
                    model: "llama3".into(),
                    in_flight: 0,
                    max_concurrency: None,
                },
            ]
        );
    }

    #[test]
    fn test_admission_bound() {
        let manager = SlotManager::new(&models(&[("gemma", Some(2))]));

        let first = manager.acquire("gemma", "r1").unwrap();
        let _second = manager.acquire("gemma", "r2").unwrap();
        let err = manager.acquire("gemma", "r3").unwrap_err();
        assert_eq!(
            err,
            SidecarError::ConcurrencyLimit {
                model: "gemma".into(),
                max_concurrency: 2,
                current: 2,
            }
        );
        assert_eq!(manager.current_count("gemma"), 2);

        first.release().unwrap();
        assert_eq!(manager.current_count("gemma"), 1);
        assert!(manager.acquire("gemma", "r4").is_ok());
    }

    #[test]
    fn test_unlimited_model_always_admits() {
        let manager = SlotManager::new(&models(&[("llama3", None)]));
        let guards: Vec<_> = (0..50)
            .map(|i| manager.acquire("llama3", &format!("r{}", i)).unwrap())
            .collect();
        assert_eq!(manager.current_count("llama3"), 50);
        drop(guards);
        assert_eq!(manager.current_count("llama3"), 0);
    }

    #[test]
    fn test_release_unknown_token() {
        let manager = SlotManager::new(&models(&[("gemma", Some(1))]));
        let guard = manager.acquire("gemma", "r1").unwrap();
        let token = guard.token();

        assert!(manager.release(token).is_ok());
        assert_eq!(manager.release(token), Err(SlotError::NotFound(token)));
        assert_eq!(manager.current_count("gemma"), 0);

        // Guard drop after an explicit release must not double-decrement.
        let _other = manager.acquire("gemma", "r2").unwrap();
        drop(guard);
        assert_eq!(manager.current_count("gemma"), 1);
    }

    #[test]
    fn test_concurrent_acquire_never_overshoots() {
        let manager = SlotManager::new(&models(&[("gemma", Some(3))]));
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = manager.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    manager.acquire("gemma", &format!("t{}", i)).ok()
                })
            })
            .collect();

        let granted: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(granted.len(), 3);
        assert_eq!(manager.current_count("gemma"), 3);
    }

    #[test]
    fn test_reconfigure_keeps_live_slots() {
        let manager = SlotManager::new(&models(&[("gemma", Some(2))]));
        let _a = manager.acquire("gemma", "r1").unwrap();
        let _b = manager.acquire("gemma", "r2").unwrap();

        manager.configure(&models(&[("gemma", Some(1)), ("phi3", Some(1))]));
        assert_eq!(manager.current_count("gemma"), 2);
        assert_eq!(manager.current_count("phi3"), 0);
        assert!(manager.acquire("gemma", "r3").is_err());
        assert!(manager.acquire("phi3", "r4").is_ok());
    }

    #[test]
    fn test_reconfigure_prunes_idle_removed_models() {
        let manager = SlotManager::new(&models(&[("gemma", Some(2)), ("llama3", None)]));
        let held = manager.acquire("llama3", "r1").unwrap();

        manager.configure(&models(&[("phi3", Some(1))]));
        let listed: Vec<_> = manager
            .snapshot()
            .into_iter()
            .map(|u| (u.model, u.in_flight, u.max_concurrency))
            .collect();
        assert_eq!(
            listed,
            vec![("llama3".to_string(), 1, None), ("phi3".to_string(), 0, Some(1))]
        );

        drop(held);
        assert_eq!(manager.current_count("llama3"), 0);
        manager.configure(&models(&[("phi3", Some(1))]));
        assert_eq!(manager.snapshot().len(), 1);
    }
}
