//! Request and response bodies for the HTTP API

use crate::task::{TaskRecord, TaskStatus, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Body of `POST /api/v1/tasks/analyze-niche`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NicheAnalysisRequest {
    pub project_id: String,
    #[serde(default)]
    pub requester_id: Option<String>,
    /// Passions, skills and an optional initial idea
    pub user_input: Value,
}

/// Body of `POST /api/v1/tasks`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenericTaskRequest {
    pub task_type: TaskType,
    pub project_id: String,
    #[serde(default)]
    pub requester_id: Option<String>,
    pub payload: Value,
}

/// `202 Accepted` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAcceptedResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub message: String,
}

/// Polling view of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskRecord> for TaskStatusResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.id,
            task_type: record.task_type,
            status: record.status,
            result: record.result,
            error: record.error_message,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Submission;
    use serde_json::json;

    #[test]
    fn test_requester_is_optional() {
        let request: NicheAnalysisRequest = serde_json::from_value(json!({
            "project_id": "p1",
            "user_input": {"passions": ["a"], "skills": ["b"]}
        }))
        .unwrap();
        assert!(request.requester_id.is_none());
    }

    #[test]
    fn test_generic_request_rejects_unknown_task_type() {
        let result: Result<GenericTaskRequest, _> = serde_json::from_value(json!({
            "task_type": "WRITE_POEM",
            "project_id": "p1",
            "payload": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_response_from_record() {
        let record = TaskRecord::new_pending(Submission {
            task_type: TaskType::AnalyzeNiche,
            project_id: "p1".into(),
            requester_id: "u1".into(),
            payload: json!({}),
        });
        let id = record.id;

        let json = serde_json::to_value(TaskStatusResponse::from(record)).unwrap();
        assert_eq!(json["task_id"], id.to_string());
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["task_type"], "ANALYZE_NICHE");
        assert!(json["result"].is_null());
        assert!(json["error"].is_null());
    }
}
