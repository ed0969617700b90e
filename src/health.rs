//! Health checks for the task service
//!
//! Each component reports on itself through [`HealthCheck`]; the
//! [`HealthCheckManager`] aggregates the results into the report served on
//! `GET /health`. The service is healthy only when every component is.

use crate::agents::AgentCapability;
use crate::store::TaskStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Health check result
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub component: String,
    pub healthy: bool,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Aggregated report for all components
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// "healthy" or "unhealthy"
    pub status: &'static str,
    pub components: Vec<HealthCheckResult>,
    pub timestamp: String,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Trait for components that can be health checked
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;

    /// Component name for reporting
    fn component_name(&self) -> &str;
}

/// Task store reachability
pub struct StoreHealthCheck {
    store: Arc<dyn TaskStore>,
}

impl StoreHealthCheck {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheck for StoreHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = self.store.ping().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let (healthy, message) = match outcome {
            Ok(()) => (true, format!("{} store reachable", self.store.backend_name())),
            Err(e) => {
                warn!(backend = self.store.backend_name(), "Store health check failed: {}", e);
                (false, format!("{} store error: {}", self.store.backend_name(), e))
            }
        };
        debug!(healthy, response_time_ms, "Store health check");

        HealthCheckResult {
            component: self.component_name().to_string(),
            healthy,
            message: Some(message),
            response_time_ms: Some(response_time_ms),
        }
    }

    fn component_name(&self) -> &str {
        "task_store"
    }
}

/// Whether the agent backend can run steps at all
///
/// Only configuration is checked; pinging the provider on every probe would
/// spend API quota.
pub struct AgentBackendHealthCheck {
    agents: Arc<dyn AgentCapability>,
}

impl AgentBackendHealthCheck {
    pub fn new(agents: Arc<dyn AgentCapability>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl HealthCheck for AgentBackendHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let healthy = self.agents.is_configured();
        let message = if healthy {
            "agent backend configured"
        } else {
            "agent backend not configured, tasks will fail"
        };

        HealthCheckResult {
            component: self.component_name().to_string(),
            healthy,
            message: Some(message.to_string()),
            response_time_ms: Some(0),
        }
    }

    fn component_name(&self) -> &str {
        "agent_backend"
    }
}

/// Aggregated health check manager
#[derive(Default)]
pub struct HealthCheckManager {
    health_checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthCheckManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_health_check(&mut self, health_check: Box<dyn HealthCheck>) {
        self.health_checks.push(health_check);
    }

    pub async fn run_health_checks(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.health_checks.len());
        for health_check in &self.health_checks {
            results.push(health_check.health_check().await);
        }
        results
    }

    /// Run every check; healthy only if all components are
    pub async fn report(&self) -> HealthReport {
        let components = self.run_health_checks().await;
        if components.is_empty() {
            warn!("No health checks configured - assuming healthy");
        }

        let healthy = components.iter().all(|c| c.healthy);
        HealthReport {
            status: if healthy { "healthy" } else { "unhealthy" },
            components,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::LlmAgents;
    use crate::store::InMemoryTaskStore;
    use crate::testing::mocks::{ScriptedCapability, UnavailableStore};

    #[tokio::test]
    async fn test_store_health_check_healthy() {
        let check = StoreHealthCheck::new(Arc::new(InMemoryTaskStore::new()));
        let result = check.health_check().await;

        assert_eq!(result.component, "task_store");
        assert!(result.healthy);
        assert!(result.response_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_store_health_check_unhealthy() {
        let check = StoreHealthCheck::new(Arc::new(UnavailableStore));
        let result = check.health_check().await;

        assert!(!result.healthy);
        assert!(result.message.unwrap().contains("error"));
    }

    #[tokio::test]
    async fn test_agent_backend_health() {
        let configured = AgentBackendHealthCheck::new(Arc::new(ScriptedCapability::new()));
        assert!(configured.health_check().await.healthy);

        let unconfigured = AgentBackendHealthCheck::new(Arc::new(LlmAgents::unconfigured("no key")));
        assert!(!unconfigured.health_check().await.healthy);
    }

    #[tokio::test]
    async fn test_manager_requires_all_healthy() {
        let mut manager = HealthCheckManager::new();
        manager.add_health_check(Box::new(StoreHealthCheck::new(Arc::new(
            InMemoryTaskStore::new(),
        ))));
        assert!(manager.report().await.is_healthy());

        manager.add_health_check(Box::new(StoreHealthCheck::new(Arc::new(UnavailableStore))));
        let report = manager.report().await;
        assert!(!report.is_healthy());
        assert_eq!(report.components.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_manager_is_healthy() {
        assert!(HealthCheckManager::new().report().await.is_healthy());
    }
}
