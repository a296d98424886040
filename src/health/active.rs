//! Active upstream health checking.
//!
//! # Responsibilities
//! - Periodically probe the upstream's `/api/tags`
//! - Update the shared health state based on results

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::state::UpstreamHealth;
use crate::observability::metrics;
use crate::upstream::OllamaClient;

pub struct HealthMonitor {
    client: OllamaClient,
    config: HealthCheckConfig,
    health: Arc<UpstreamHealth>,
}

impl HealthMonitor {
    pub fn new(client: OllamaClient, config: HealthCheckConfig, health: Arc<UpstreamHealth>) -> Self {
        Self {
            client,
            config,
            health,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Upstream health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            upstream = %self.client.base_url(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe and record the outcome.
    pub async fn check(&self) {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        match self.client.ping(timeout).await {
            Ok(()) => self.health.mark_success(self.config.healthy_threshold as usize),
            Err(e) => {
                tracing::warn!(error = %e, "Upstream health check failed");
                self.health.mark_failure(self.config.unhealthy_threshold as usize);
            }
        }
        metrics::record_upstream_health(self.health.state() == crate::health::HealthState::Healthy);
    }
}
