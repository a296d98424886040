//! RAII ownership of an admitted slot.

use std::sync::Arc;

use crate::slots::manager::{SlotError, SlotManager, SlotToken};

/// A live slot. Dropping the guard releases the slot.
///
/// The guard lives in the future that acquired it, so a panic unwinding
/// through that future or an abort of its task releases the slot as well.
#[derive(Debug)]
pub struct SlotGuard {
    manager: Arc<SlotManager>,
    token: SlotToken,
    model: String,
    released: bool,
}

impl SlotGuard {
    pub(crate) fn new(manager: Arc<SlotManager>, token: SlotToken, model: String) -> Self {
        Self {
            manager,
            token,
            model,
            released: false,
        }
    }

    pub fn token(&self) -> SlotToken {
        self.token
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Release explicitly, surfacing `NotFound` if the token was already released by token.
    pub fn release(mut self) -> Result<(), SlotError> {
        self.released = true;
        self.manager.release(self.token)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let abnormal = std::thread::panicking();
        match self.manager.release(self.token) {
            Ok(()) if abnormal => {
                tracing::warn!(model = %self.model, slot = %self.token, "Slot auto-released after owner panicked");
            }
            Ok(()) => {}
            Err(SlotError::NotFound(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn gemma(max: usize) -> Arc<SlotManager> {
        let mut models = BTreeMap::new();
        models.insert(
            "gemma".to_string(),
            ModelConfig {
                max_concurrency: Some(max),
                timeout_ms: None,
            },
        );
        SlotManager::new(&models)
    }

    #[test]
    fn test_release_consumes_guard() {
        let manager = gemma(1);
        let guard = manager.acquire("gemma", "r1").unwrap();
        assert_eq!(guard.model(), "gemma");
        guard.release().unwrap();
        assert_eq!(manager.current_count("gemma"), 0);
    }

    #[tokio::test]
    async fn test_auto_release_on_panic() {
        let manager = gemma(1);
        let m = manager.clone();

        let result = tokio::spawn(async move {
            let _slot = m.acquire("gemma", "crashy").unwrap();
            panic!("worker crashed");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        assert_eq!(manager.current_count("gemma"), 0);
        assert!(manager.acquire("gemma", "next").is_ok());
    }

    #[tokio::test]
    async fn test_auto_release_on_abort() {
        let manager = gemma(1);
        let m = manager.clone();
        let (held_tx, held_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let _slot = m.acquire("gemma", "stuck").unwrap();
            let _ = held_tx.send(());
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        held_rx.await.unwrap();
        assert_eq!(manager.current_count("gemma"), 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(manager.current_count("gemma"), 0);
    }
}
