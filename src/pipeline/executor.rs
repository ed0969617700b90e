//! Pipeline executor
//!
//! Runs one pipeline definition for one task: mark the task PROCESSING, run
//! each step in order against the accumulated context, then record the
//! outcome through the orchestrator. Steps never run concurrently within a
//! run; a step's input is undefined without its predecessor's output.

use super::context::ExecutionContext;
use super::definition::{PipelineRegistry, StepSpec};
use crate::agents::{AgentCapability, CapabilityError};
use crate::config::RetrySection;
use crate::observability::metrics::metrics;
use crate::orchestrator::{PipelineJob, TaskOrchestrator};
use crate::store::StoreTransition;
use crate::task::{TaskRecord, TaskStatus};
use crate::{step_span, task_span};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Bounded immediate retry of transient step failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::ZERO,
        }
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            delay: Duration::from_millis(section.delay_ms),
        }
    }
}

/// How a single run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every step succeeded; carries the assembled result
    Completed(Value),
    /// The run stopped early; carries the recorded error message
    Failed(String),
    /// The record had already left PENDING, so this delivery was a duplicate
    Skipped(TaskStatus),
}

/// Outcome reported by a record that was already terminal
fn stored_outcome(record: TaskRecord) -> RunOutcome {
    match record.status {
        TaskStatus::Completed => RunOutcome::Completed(record.result.unwrap_or(Value::Null)),
        TaskStatus::Failed => RunOutcome::Failed(record.error_message.unwrap_or_default()),
        status => RunOutcome::Skipped(status),
    }
}

/// A step that failed for good, after any retries
#[derive(Debug)]
struct StepFailure {
    step: String,
    capability: String,
    error: CapabilityError,
    attempts: u32,
}

impl StepFailure {
    fn message(&self) -> String {
        format!(
            "step '{}' ({}) failed after {} attempt(s): {}",
            self.step, self.capability, self.attempts, self.error
        )
    }
}

pub struct PipelineExecutor {
    orchestrator: Arc<TaskOrchestrator>,
    registry: Arc<PipelineRegistry>,
    agents: Arc<dyn AgentCapability>,
    retry: RetryPolicy,
}

impl PipelineExecutor {
    pub fn new(
        orchestrator: Arc<TaskOrchestrator>,
        registry: Arc<PipelineRegistry>,
        agents: Arc<dyn AgentCapability>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            agents,
            retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run a job to a terminal state; failures are recorded, never returned
    pub async fn run(&self, job: PipelineJob) -> RunOutcome {
        let span = task_span!(task_id = %job.task_id, task_type = %job.task_type);
        self.run_inner(job).instrument(span).await
    }

    async fn run_inner(&self, job: PipelineJob) -> RunOutcome {
        let started = Instant::now();
        let task_id = job.task_id;

        let Some(definition) = self.registry.get(job.task_type) else {
            let message = format!("no pipeline registered for task type {}", job.task_type);
            error!("{}", message);
            return self.finish_failed(task_id, message).await;
        };

        match self.orchestrator.mark_processing(task_id).await {
            Ok(StoreTransition::Applied(_)) => {}
            Ok(StoreTransition::Ignored(record)) => {
                metrics().duplicate_delivery_skipped();
                info!(status = %record.status, "Task already picked up, skipping duplicate delivery");
                return RunOutcome::Skipped(record.status);
            }
            Err(e) => {
                error!("Could not mark task as processing, aborting run: {}", e);
                return self
                    .finish_failed(task_id, format!("could not start processing: {e}"))
                    .await;
            }
        }

        let mut context = ExecutionContext::new(task_id, job.task_type, job.payload);
        info!(steps = definition.steps.len(), "Pipeline run started");

        for step in &definition.steps {
            match self.run_step(step, &context).await {
                Ok(output) => {
                    debug!(step = %step.name, "Step output recorded");
                    context.record(step, output);
                }
                Err(failure) => {
                    let message = failure.message();
                    error!(step = %failure.step, "Pipeline run failed: {}", message);
                    metrics().record_run_duration(started.elapsed());
                    return self.finish_failed(task_id, message).await;
                }
            }
        }

        let result = context.into_result(definition.assembly);
        metrics().record_run_duration(started.elapsed());

        match self.orchestrator.mark_completed(task_id, result.clone()).await {
            Ok(StoreTransition::Applied(_)) => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "Pipeline run completed");
                RunOutcome::Completed(result)
            }
            Ok(StoreTransition::Ignored(record)) => {
                warn!(
                    status = %record.status,
                    "Pipeline finished but the task was already terminal, keeping stored outcome"
                );
                stored_outcome(record)
            }
            Err(e) => {
                error!("Pipeline finished but completion could not be recorded: {}", e);
                self.finish_failed(task_id, format!("could not record completion: {e}"))
                    .await
            }
        }
    }

    /// Invoke one step, retrying transient failures within the policy
    async fn run_step(
        &self,
        step: &StepSpec,
        context: &ExecutionContext,
    ) -> Result<Value, StepFailure> {
        let mut attempt = 1;

        loop {
            let span = step_span!(
                step = %step.name,
                capability = %step.agent_capability,
                attempt = attempt
            );
            let started = Instant::now();
            let outcome = self.agents.invoke(step, context).instrument(span).await;
            metrics().record_step_attempt(&step.agent_capability, started.elapsed(), outcome.is_ok());

            match outcome {
                Ok(output) => return Ok(output),
                Err(error) if error.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(
                        step = %step.name,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        "Transient step failure, retrying: {}",
                        error
                    );
                    metrics().step_retried();
                    if !self.retry.delay.is_zero() {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => {
                    return Err(StepFailure {
                        step: step.name.clone(),
                        capability: step.agent_capability.clone(),
                        error,
                        attempts: attempt,
                    })
                }
            }
        }
    }

    async fn finish_failed(&self, task_id: Uuid, message: String) -> RunOutcome {
        match self.orchestrator.mark_failed(task_id, &message).await {
            Ok(transition) => {
                let record = transition.into_record();
                RunOutcome::Failed(record.error_message.unwrap_or(message))
            }
            Err(e) => {
                error!(task_id = %task_id, "Failure could not be recorded: {}", e);
                RunOutcome::Failed(message)
            }
        }
    }

    /// Record a run that ended without reaching a terminal state (e.g. a panic)
    pub async fn fail_aborted_run(&self, task_id: Uuid, reason: &str) {
        if let Err(e) = self
            .orchestrator
            .mark_failed(task_id, format!("pipeline run aborted: {reason}"))
            .await
        {
            error!(task_id = %task_id, "Failed to record aborted run: {}", e);
        }
    }
}
