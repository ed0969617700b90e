//! Test helpers and utilities for integration tests

use crewline::agents::AgentCapability;
use crewline::config::ServiceConfig;
use crewline::orchestrator::{Dispatcher, TaskOrchestrator};
use crewline::pipeline::{PipelineExecutor, PipelineRegistry, RetryPolicy};
use crewline::store::{InMemoryTaskStore, TaskStore};
use crewline::task::{Submission, TaskRecord, TaskStatus, TaskType};
use crewline::testing::RecordingDispatcher;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Service configuration backed by the in-memory store
#[allow(dead_code)]
pub fn test_config() -> ServiceConfig {
    ServiceConfig::from_toml_str(
        r#"
[service]
name = "crewline-test"
port = 18000

[store]
backend = "memory"

[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "CREWLINE_INTEGRATION_UNSET_KEY"

[workers]
count = 2

[retry]
max_attempts = 3
"#,
    )
    .expect("test config should parse")
}

#[allow(dead_code)]
pub fn niche_payload() -> Value {
    json!({
        "passions": ["cooking", "travel"],
        "skills": ["video editing"],
        "initial_idea": "budget travel recipes"
    })
}

#[allow(dead_code)]
pub fn niche_submission() -> Submission {
    Submission {
        task_type: TaskType::AnalyzeNiche,
        project_id: "project-1".to_string(),
        requester_id: "user-1".to_string(),
        payload: niche_payload(),
    }
}

/// Orchestrator and executor wired to a recording dispatcher
///
/// Jobs are captured rather than run so tests can drive the executor
/// directly and deterministically.
#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<dyn TaskStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub executor: PipelineExecutor,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(agents: Arc<dyn AgentCapability>) -> Self {
        Self::with_store(Arc::new(InMemoryTaskStore::new()), agents)
    }

    pub fn with_store(store: Arc<dyn TaskStore>, agents: Arc<dyn AgentCapability>) -> Self {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let orchestrator = Arc::new(TaskOrchestrator::new(
            store.clone(),
            dispatcher.clone() as Arc<dyn Dispatcher>,
        ));
        let executor = PipelineExecutor::new(
            orchestrator.clone(),
            Arc::new(PipelineRegistry::with_defaults()),
            agents,
            RetryPolicy::default(),
        );
        Self {
            store,
            dispatcher,
            orchestrator,
            executor,
        }
    }

    /// Submit a niche analysis and return the queued job's record
    pub async fn submit_niche(&self) -> TaskRecord {
        self.orchestrator
            .submit(niche_submission())
            .await
            .expect("submission should be accepted")
    }

    /// The most recently dispatched job
    pub fn last_job(&self) -> crewline::orchestrator::PipelineJob {
        self.dispatcher
            .jobs()
            .pop()
            .expect("a job should have been dispatched")
    }

    pub async fn record(&self, id: Uuid) -> TaskRecord {
        self.orchestrator
            .get_status(id)
            .await
            .expect("record should exist")
    }
}

/// Poll until the task reaches a terminal status or the timeout expires
#[allow(dead_code)]
pub async fn wait_for_terminal(
    orchestrator: &TaskOrchestrator,
    id: Uuid,
    timeout: Duration,
) -> TaskRecord {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let record = orchestrator
            .get_status(id)
            .await
            .expect("record should exist");
        if record.status.is_terminal() {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} still {} after {:?}",
            record.status,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[allow(dead_code)]
pub fn assert_status(record: &TaskRecord, status: TaskStatus) {
    assert_eq!(
        record.status, status,
        "unexpected status, error: {:?}",
        record.error_message
    );
}
