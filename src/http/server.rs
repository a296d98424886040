//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the generation, status and liveness routes
//! - Wire up middleware (request ID, tracing, body limit)
//! - Spawn the health monitor and config reload loop next to the server
//! - Serve until the shutdown signal fires

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{watcher, SidecarConfig};
use crate::dispatch::Dispatcher;
use crate::error::SidecarResult;
use crate::health::{HealthMonitor, UpstreamHealth};
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::upstream::{Generator, OllamaClient};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub health: Arc<UpstreamHealth>,
    pub upstream_url: String,
}

/// HTTP front of the sidecar.
pub struct HttpServer {
    router: Router,
    config: SidecarConfig,
    state: AppState,
    client: OllamaClient,
}

impl HttpServer {
    /// Create a server that talks to the configured upstream.
    pub fn new(config: SidecarConfig) -> SidecarResult<Self> {
        let client = OllamaClient::new(&config.upstream)?;
        let generator: Arc<dyn Generator> = Arc::new(client.clone());
        Ok(Self::assemble(config, client, generator))
    }

    /// Create a server whose dispatches go to `generator`. The health monitor
    /// still probes the configured upstream.
    pub fn with_generator(config: SidecarConfig, generator: Arc<dyn Generator>) -> SidecarResult<Self> {
        let client = OllamaClient::new(&config.upstream)?;
        Ok(Self::assemble(config, client, generator))
    }

    fn assemble(config: SidecarConfig, client: OllamaClient, generator: Arc<dyn Generator>) -> Self {
        let state = AppState {
            dispatcher: Dispatcher::from_config(&config, generator),
            health: Arc::new(UpstreamHealth::new()),
            upstream_url: client.base_url().to_string(),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
            client,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &SidecarConfig, state: AppState) -> Router {
        Router::new()
            .route("/v1/llm/{model}", post(handlers::generate))
            .route("/v1/llm/{model}/stream", post(handlers::generate_stream))
            .route("/v1/status", get(handlers::status))
            .route("/health", get(handlers::liveness))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// `config_updates` carries configs produced by a file watcher; each one
    /// is applied to the dispatcher as it arrives.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<SidecarConfig>>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.state.upstream_url,
            models = self.config.models.len(),
            "HTTP server starting"
        );

        if self.config.health.enabled {
            let monitor = HealthMonitor::new(
                self.client.clone(),
                self.config.health.clone(),
                self.state.health.clone(),
            );
            tokio::spawn(monitor.run(shutdown.subscribe()));
        }

        if let Some(updates) = config_updates {
            tokio::spawn(watcher::apply_updates(
                self.state.dispatcher.clone(),
                updates,
                shutdown.subscribe(),
            ));
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.state.dispatcher
    }
}
