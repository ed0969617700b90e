//! crewline - asynchronous LLM task orchestration
//!
//! Clients submit a task over HTTP and get an identifier back immediately.
//! A background worker pool then runs the task's pipeline, a fixed sequence
//! of agent steps where each step sees the outputs of the ones before it,
//! and the durable task record moves PENDING → PROCESSING → COMPLETED or
//! FAILED. Clients poll the record for the final result.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use crewline::config::ServiceConfig;
//! use crewline::service::TaskService;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::load_from_file("crewline.toml".as_ref())?;
//! let service = TaskService::from_config(config).await?;
//! service.start().await;
//! service.serve(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod task;
pub mod testing;

pub use agents::{AgentCapability, CapabilityError, LlmAgents};
pub use config::{ConfigError, ServiceConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{TaskOrchestrator, WorkerPool};
pub use pipeline::{PipelineDefinition, PipelineExecutor, PipelineRegistry, RunOutcome};
pub use service::{ServiceError, TaskService};
pub use store::{StoreError, StoreTransition, TaskStore};
pub use task::{Submission, TaskRecord, TaskStatus, TaskType};
