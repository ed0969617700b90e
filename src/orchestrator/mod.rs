//! Task orchestrator
//!
//! The single authority for task identity and status transitions. Every
//! transition is one durable write through the [`TaskStore`]; transitions
//! that would not advance a record are logged and ignored so duplicate
//! completion signals are harmless.

pub mod dispatcher;

pub use dispatcher::{DispatchError, Dispatcher, PipelineJob, WorkerPool};

use crate::error::{sanitize_error_message, OrchestratorError, OrchestratorResult};
use crate::observability::metrics::metrics;
use crate::store::{StoreTransition, TaskStore};
use crate::task::{StatusChange, Submission, TaskRecord, TaskStatus};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl TaskOrchestrator {
    pub fn new(store: Arc<dyn TaskStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Validate, record as PENDING and dispatch a submission
    ///
    /// Returns as soon as the job is queued. Nothing is written when
    /// validation fails, and nothing is dispatched when the write fails.
    pub async fn submit(&self, submission: Submission) -> OrchestratorResult<TaskRecord> {
        if let Err(message) = Self::validate(&submission) {
            metrics().task_rejected();
            warn!(task_type = %submission.task_type, "Rejected submission: {}", message);
            return Err(OrchestratorError::validation(message));
        }

        let record = TaskRecord::new_pending(submission);
        if let Err(e) = self.store.insert(&record).await {
            metrics().task_rejected();
            error!(task_id = %record.id, "Failed to record submission: {}", e);
            return Err(e.into());
        }
        metrics().task_submitted();

        let job = PipelineJob {
            task_id: record.id,
            task_type: record.task_type,
            payload: record.payload.clone(),
        };

        if let Err(e) = self.dispatcher.dispatch(job) {
            error!(task_id = %record.id, "Failed to dispatch task: {}", e);
            // Leave a terminal record rather than a PENDING one nobody will run
            if let Err(mark_err) = self
                .mark_failed(record.id, "dispatch queue unavailable")
                .await
            {
                error!(task_id = %record.id, "Failed to mark undispatched task: {}", mark_err);
            }
            return Err(OrchestratorError::dispatch_unavailable(e.to_string()));
        }

        info!(
            task_id = %record.id,
            task_type = %record.task_type,
            project_id = %record.project_id,
            "Task accepted for processing"
        );
        Ok(record)
    }

    fn validate(submission: &Submission) -> Result<(), String> {
        if submission.project_id.trim().is_empty() {
            return Err("project_id is required".to_string());
        }
        if submission.requester_id.trim().is_empty() {
            return Err("requester_id is required".to_string());
        }
        submission.task_type.validate_payload(&submission.payload)
    }

    /// Move a task to PROCESSING
    pub async fn mark_processing(&self, id: Uuid) -> OrchestratorResult<StoreTransition> {
        self.transition(id, StatusChange::Processing).await
    }

    /// Move a task to COMPLETED with its result
    pub async fn mark_completed(
        &self,
        id: Uuid,
        result: Value,
    ) -> OrchestratorResult<StoreTransition> {
        self.transition(id, StatusChange::Completed(result)).await
    }

    /// Move a task to FAILED; the message is sanitized before it is stored
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: impl AsRef<str>,
    ) -> OrchestratorResult<StoreTransition> {
        let message = sanitize_error_message(error.as_ref());
        self.transition(id, StatusChange::Failed(message)).await
    }

    async fn transition(
        &self,
        id: Uuid,
        change: StatusChange,
    ) -> OrchestratorResult<StoreTransition> {
        let target = change.target();
        let outcome = self.store.advance(id, change).await?;

        match &outcome {
            StoreTransition::Applied(record) => {
                record_transition_metric(target);
                info!(task_id = %id, status = %record.status, "Task status updated");
            }
            StoreTransition::Ignored(record) => {
                warn!(
                    task_id = %id,
                    current = %record.status,
                    requested = %target,
                    "Ignoring status transition that does not advance the task"
                );
            }
        }

        Ok(outcome)
    }

    /// Current record for `id`
    pub async fn get_status(&self, id: Uuid) -> OrchestratorResult<TaskRecord> {
        self.store
            .get(id)
            .await?
            .ok_or(OrchestratorError::NotFound(id))
    }
}

fn record_transition_metric(status: TaskStatus) {
    let collector = metrics();
    match status {
        TaskStatus::Processing => collector.task_processing_started(),
        TaskStatus::Completed => collector.task_completed(),
        TaskStatus::Failed => collector.task_failed(),
        TaskStatus::Pending => {}
    }
}
