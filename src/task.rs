//! Task identity, status and submission types
//!
//! A task is one end-to-end unit of orchestrated work. Its record moves
//! forward through `PENDING -> PROCESSING -> {COMPLETED | FAILED}` and never
//! regresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a task record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Position in the lifecycle; terminal states share the highest rank
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` advances the lifecycle
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Statuses from which a transition to `next` is allowed
    pub fn predecessors_of(next: TaskStatus) -> Vec<TaskStatus> {
        [TaskStatus::Pending, TaskStatus::Processing]
            .into_iter()
            .filter(|s| s.can_advance_to(next))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "PROCESSING" => Ok(TaskStatus::Processing),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// Kind of analysis a task performs; selects the pipeline definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    AnalyzeNiche,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::AnalyzeNiche => "ANALYZE_NICHE",
        }
    }

    /// Check that `payload` carries the fields this task type requires
    pub fn validate_payload(self, payload: &Value) -> Result<(), String> {
        let fields = match payload.as_object() {
            Some(map) if !map.is_empty() => map,
            Some(_) => return Err("payload must not be empty".to_string()),
            None => return Err("payload must be a JSON object".to_string()),
        };

        match self {
            TaskType::AnalyzeNiche => {
                let input: NicheAnalysisInput =
                    serde_json::from_value(Value::Object(fields.clone()))
                        .map_err(|e| format!("invalid niche analysis payload: {e}"))?;
                input.validate()
            }
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANALYZE_NICHE" => Ok(TaskType::AnalyzeNiche),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

/// Payload of an `ANALYZE_NICHE` task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicheAnalysisInput {
    pub passions: Vec<String>,
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_idea: Option<String>,
}

impl NicheAnalysisInput {
    /// Both lists need at least one entry and no blank entries
    pub fn validate(&self) -> Result<(), String> {
        for (field, values) in [("passions", &self.passions), ("skills", &self.skills)] {
            if values.is_empty() {
                return Err(format!("'{field}' requires at least one entry"));
            }
            if values.iter().any(|v| v.trim().is_empty()) {
                return Err(format!("'{field}' must not contain blank entries"));
            }
        }
        Ok(())
    }
}

/// Canonical submission handed over by the submission API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub task_type: TaskType,
    pub project_id: String,
    pub requester_id: String,
    pub payload: Value,
}

/// Durable record of a task's identity and progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub project_id: String,
    pub requester_id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub payload: Value,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Build a fresh PENDING record with a newly generated id
    pub fn new_pending(submission: Submission) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: submission.project_id,
            requester_id: submission.requester_id,
            task_type: submission.task_type,
            status: TaskStatus::Pending,
            payload: submission.payload,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A requested status change together with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Processing,
    Completed(Value),
    Failed(String),
}

impl StatusChange {
    pub fn target(&self) -> TaskStatus {
        match self {
            StatusChange::Processing => TaskStatus::Processing,
            StatusChange::Completed(_) => TaskStatus::Completed,
            StatusChange::Failed(_) => TaskStatus::Failed,
        }
    }

    /// Apply the change to `record`, keeping the result/error invariant
    pub fn apply_to(self, record: &mut TaskRecord, at: DateTime<Utc>) {
        record.status = self.target();
        match self {
            StatusChange::Processing => {}
            StatusChange::Completed(result) => {
                record.result = Some(result);
                record.error_message = None;
            }
            StatusChange::Failed(message) => {
                record.result = None;
                record.error_message = Some(message);
            }
        }
        record.updated_at = at;
    }
}
