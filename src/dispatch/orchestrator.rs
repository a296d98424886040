//! Dispatch orchestration: validate, admit, execute, release.
//!
//! # Responsibilities
//! - Reject models missing from the model table
//! - Take a slot before any upstream work
//! - Run single-shot generations in their own task under `timeout + grace`
//! - Drive the streaming callback protocol
//! - Release the slot on every exit path

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SidecarConfig;
use crate::dispatch::options::{new_request_id, DispatchOptions, DispatchRequest, DispatchSettings, Phase};
use crate::dispatch::task::{panic_message, AbortOnDrop};
use crate::error::{SidecarError, SidecarResult};
use crate::observability::metrics;
use crate::slots::{SlotGuard, SlotManager};
use crate::upstream::{EventSink, Generator, StreamEvent};

/// Entry point tying validation, admission, execution and cleanup together.
#[derive(Clone)]
pub struct Dispatcher {
    slots: Arc<SlotManager>,
    generator: Arc<dyn Generator>,
    settings: Arc<ArcSwap<DispatchSettings>>,
}

impl Dispatcher {
    /// Build a dispatcher from explicit collaborators.
    pub fn new(
        settings: DispatchSettings,
        slots: Arc<SlotManager>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            slots,
            generator,
            settings: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    /// Build a dispatcher with a fresh slot manager seeded from `config`.
    pub fn from_config(config: &SidecarConfig, generator: Arc<dyn Generator>) -> Self {
        let slots = SlotManager::new(&config.models);
        Self::new(DispatchSettings::from_config(config), slots, generator)
    }

    pub fn slots(&self) -> &Arc<SlotManager> {
        &self.slots
    }

    pub fn settings(&self) -> Arc<DispatchSettings> {
        self.settings.load_full()
    }

    /// Swap in a reloaded model table. Live slots are untouched.
    pub fn reload(&self, config: &SidecarConfig) {
        // Limits first, so a newly visible model is never admitted unbounded.
        self.slots.configure(&config.models);
        self.settings.store(Arc::new(DispatchSettings::from_config(config)));
        tracing::info!(models = config.models.len(), "Model table reloaded");
    }

    /// Run one single-shot generation.
    pub async fn dispatch(
        &self,
        model: &str,
        prompt: &str,
        options: DispatchOptions,
    ) -> SidecarResult<String> {
        let start = Instant::now();
        let settings = self.settings.load_full();

        let request = self.validate(&settings, model, prompt, &options)?;
        let slot = self.admit(&request, &options)?;

        trace_phase(&request, Phase::Executing);
        let result = self.execute(&request, settings.grace_period).await;
        self.release(slot, &request);

        finish(&request, &result, start);
        result
    }

    /// Run one streamed generation, pushing events to `on_event`.
    ///
    /// Validation and admission failures are delivered once as
    /// `StreamEvent::Error` as well as returned.
    pub async fn dispatch_stream(
        &self,
        model: &str,
        prompt: &str,
        on_event: &mut EventSink<'_>,
        options: DispatchOptions,
    ) -> SidecarResult<()> {
        let start = Instant::now();
        let settings = self.settings.load_full();

        let admitted = self
            .validate(&settings, model, prompt, &options)
            .and_then(|request| {
                let slot = self.admit(&request, &options)?;
                Ok((request, slot))
            });
        let (request, slot) = match admitted {
            Ok(admitted) => admitted,
            Err(e) => {
                on_event(StreamEvent::Error(e.clone()));
                return Err(e);
            }
        };

        trace_phase(&request, Phase::Executing);
        let bound = request.timeout + settings.grace_period;
        let outcome = tokio::time::timeout(
            bound,
            self.generator
                .generate_stream(&request.model, &request.prompt, request.timeout, on_event),
        )
        .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                // The generator was dropped before it could emit a terminal event.
                let err = SidecarError::Timeout {
                    timeout_ms: request.timeout_ms(),
                };
                on_event(StreamEvent::Error(err.clone()));
                Err(err)
            }
        };
        self.release(slot, &request);

        finish(&request, &result, start);
        result
    }

    fn validate(
        &self,
        settings: &DispatchSettings,
        model: &str,
        prompt: &str,
        options: &DispatchOptions,
    ) -> SidecarResult<DispatchRequest> {
        let request = DispatchRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            timeout: settings.resolve_timeout(model, options.timeout_ms),
            request_id: options.request_id.clone().unwrap_or_else(new_request_id),
        };
        trace_phase(&request, Phase::Validating);

        if !options.skip_validation && !settings.models.contains_key(model) {
            let err = SidecarError::ModelNotConfigured {
                model: model.to_string(),
                known_models: settings.known_models(),
            };
            reject(&request, &err);
            return Err(err);
        }
        Ok(request)
    }

    fn admit(&self, request: &DispatchRequest, options: &DispatchOptions) -> SidecarResult<Option<SlotGuard>> {
        trace_phase(request, Phase::Admitting);
        if options.skip_concurrency {
            return Ok(None);
        }
        match self.slots.acquire(&request.model, &request.request_id) {
            Ok(slot) => Ok(Some(slot)),
            Err(err) => {
                reject(request, &err);
                Err(err)
            }
        }
    }

    async fn execute(&self, request: &DispatchRequest, grace: Duration) -> SidecarResult<String> {
        let generator = self.generator.clone();
        let model = request.model.clone();
        let prompt = request.prompt.clone();
        let timeout = request.timeout;

        let mut task = AbortOnDrop(tokio::spawn(async move {
            generator.generate(&model, &prompt, timeout).await
        }));

        match tokio::time::timeout(timeout + grace, &mut task.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                let cause = panic_message(join_err.into_panic());
                tracing::error!(request_id = %request.request_id, cause = %cause, "Generation task panicked");
                Err(SidecarError::internal("execution failed", Some(cause)))
            }
            Ok(Err(join_err)) => {
                tracing::error!(request_id = %request.request_id, error = %join_err, "Generation task terminated");
                Err(SidecarError::internal(
                    "terminated unexpectedly",
                    Some(join_err.to_string()),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    timeout_ms = request.timeout_ms(),
                    "Generation exceeded its deadline, abandoning"
                );
                Err(SidecarError::Timeout {
                    timeout_ms: request.timeout_ms(),
                })
            }
        }
    }

    fn release(&self, slot: Option<SlotGuard>, request: &DispatchRequest) {
        if let Some(slot) = slot {
            if let Err(e) = slot.release() {
                tracing::error!(request_id = %request.request_id, error = %e, "Slot was released twice");
            }
        }
    }
}

fn trace_phase(request: &DispatchRequest, phase: Phase) {
    tracing::trace!(request_id = %request.request_id, model = %request.model, phase = %phase, "Dispatch phase");
}

fn reject(request: &DispatchRequest, err: &SidecarError) {
    tracing::info!(
        request_id = %request.request_id,
        model = %request.model,
        phase = %Phase::Rejected,
        error = %err,
        "Dispatch rejected"
    );
    metrics::record_dispatch(&request.model, err.status_code().as_u16(), None);
}

fn finish<T>(request: &DispatchRequest, result: &SidecarResult<T>, start: Instant) {
    let status = match result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    tracing::info!(
        request_id = %request.request_id,
        model = %request.model,
        phase = %Phase::Completed,
        status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Dispatch finished"
    );
    metrics::record_dispatch(&request.model, status, Some(start));
}
