//! Service assembly and lifecycle
//!
//! Wires the store, worker pool, orchestrator, executor and HTTP routes
//! together. The pool is created first so the orchestrator can dispatch to
//! it; workers start once the executor exists.

use crate::agents::{AgentCapability, LlmAgents};
use crate::api::{self, ApiState};
use crate::config::{ConfigError, ServiceConfig};
use crate::health::{AgentBackendHealthCheck, HealthCheckManager, StoreHealthCheck};
use crate::orchestrator::{TaskOrchestrator, WorkerPool};
use crate::pipeline::{PipelineExecutor, PipelineRegistry, RetryPolicy};
use crate::store::{open_store, StoreError, TaskStore};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to bind HTTP listener: {0}")]
    Bind(String),
}

pub struct TaskService {
    config: ServiceConfig,
    orchestrator: Arc<TaskOrchestrator>,
    executor: Arc<PipelineExecutor>,
    pool: Arc<WorkerPool>,
    health: Arc<HealthCheckManager>,
}

impl TaskService {
    /// Build every component from configuration
    pub async fn from_config(config: ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let store = open_store(&config.store).await?;
        info!(backend = store.backend_name(), "Task store opened");

        let agents: Arc<dyn AgentCapability> = Arc::new(LlmAgents::from_config(&config));
        Ok(Self::with_components(config, store, agents))
    }

    /// Build around an existing store and agent backend
    pub fn with_components(
        config: ServiceConfig,
        store: Arc<dyn TaskStore>,
        agents: Arc<dyn AgentCapability>,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(config.workers.count));
        let orchestrator = Arc::new(TaskOrchestrator::new(store.clone(), pool.clone()));
        let executor = Arc::new(PipelineExecutor::new(
            orchestrator.clone(),
            Arc::new(PipelineRegistry::with_defaults()),
            agents.clone(),
            RetryPolicy::from(&config.retry),
        ));

        let mut health = HealthCheckManager::new();
        health.add_health_check(Box::new(StoreHealthCheck::new(store)));
        health.add_health_check(Box::new(AgentBackendHealthCheck::new(agents)));

        Self {
            config,
            orchestrator,
            executor,
            pool,
            health: Arc::new(health),
        }
    }

    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        &self.orchestrator
    }

    pub fn executor(&self) -> &Arc<PipelineExecutor> {
        &self.executor
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Start background workers
    pub async fn start(&self) {
        self.pool.start(self.executor.clone()).await;
    }

    /// HTTP routes for this service
    pub fn routes(
        &self,
    ) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone
    {
        let state = Arc::new(ApiState {
            orchestrator: self.orchestrator.clone(),
            health: self.health.clone(),
            service_name: self.config.service.name.clone(),
        });
        api::routes(state, &self.config.cors_origins())
    }

    /// Serve HTTP until `shutdown` resolves, then drain the worker queue
    pub async fn serve(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServiceError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.effective_port()));
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| ServiceError::Bind(e.to_string()))?;

        info!(address = %bound, service = %self.config.service.name, "HTTP server listening");
        server.await;
        info!("HTTP server stopped accepting requests");

        self.shutdown().await;
        Ok(())
    }

    /// Close the queue and wait for in-flight runs
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
