//! Mock implementations for testing
//!
//! Scripted agents, a scripted LLM provider, recording dispatchers and
//! failing stores, so orchestration can be exercised without a network or a
//! database.

use crate::agents::{AgentCapability, CapabilityError};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::orchestrator::{DispatchError, Dispatcher, PipelineJob};
use crate::pipeline::{ExecutionContext, OutputShape, StepSpec};
use crate::store::{InMemoryTaskStore, StoreError, StoreTransition, TaskStore};
use crate::task::{StatusChange, TaskRecord, TaskStatus};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One recorded agent invocation
#[derive(Debug, Clone, PartialEq)]
pub struct StepCall {
    pub task_id: Uuid,
    pub step: String,
    pub capability: String,
    /// Names of the steps whose outputs were in the context
    pub prior_steps: Vec<String>,
}

/// Agent capability with per-capability scripted outcomes
///
/// Queued outcomes are consumed in order; once a capability's queue is empty
/// it answers with a default output of the right shape.
#[derive(Default)]
pub struct ScriptedCapability {
    scripts: Mutex<HashMap<String, VecDeque<Result<Value, CapabilityError>>>>,
    calls: Mutex<Vec<StepCall>>,
    panic_on: HashSet<String>,
    delay: Option<Duration>,
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for one capability
    pub fn script(
        self,
        capability: impl Into<String>,
        outcomes: Vec<Result<Value, CapabilityError>>,
    ) -> Self {
        lock(&self.scripts)
            .entry(capability.into())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Panic whenever this capability is invoked
    pub fn panic_on(mut self, capability: impl Into<String>) -> Self {
        self.panic_on.insert(capability.into());
        self
    }

    /// Sleep before answering each invocation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<StepCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, capability: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.capability == capability)
            .count()
    }

    /// Output used once the script for a capability runs out
    pub fn default_output(step: &StepSpec) -> Value {
        match step.output {
            OutputShape::Text => json!(format!("mock output for {}", step.name)),
            OutputShape::RankedList => json!([
                {"name": "mock niche", "score": 50, "justification": "mock justification"}
            ]),
        }
    }
}

#[async_trait]
impl AgentCapability for ScriptedCapability {
    async fn invoke(
        &self,
        step: &StepSpec,
        ctx: &ExecutionContext,
    ) -> Result<Value, CapabilityError> {
        lock(&self.calls).push(StepCall {
            task_id: ctx.task_id(),
            step: step.name.clone(),
            capability: step.agent_capability.clone(),
            prior_steps: ctx.outputs().iter().map(|o| o.step.clone()).collect(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on.contains(&step.agent_capability) {
            panic!("scripted panic in {}", step.agent_capability);
        }

        let scripted = lock(&self.scripts)
            .get_mut(&step.agent_capability)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| Ok(Self::default_output(step)))
    }
}

/// LLM provider answering from a script
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    should_fail: bool,
}

impl MockLlmProvider {
    /// Answer with each outcome in turn, then with "Mock response"
    pub fn with_responses(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::with_responses(vec![Ok(response.into())])
    }

    /// Fail every completion and health check
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let metadata = request.metadata.clone();
        lock(&self.requests).push(request);

        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let next = lock(&self.responses).pop_front();
        let content = match next {
            Some(outcome) => outcome?,
            None => "Mock response".to_string(),
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata,
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed("Mock health check failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Dispatcher that only records jobs
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<PipelineJob>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<PipelineJob> {
        lock(&self.jobs).clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, job: PipelineJob) -> Result<(), DispatchError> {
        lock(&self.jobs).push(job);
        Ok(())
    }
}

/// Dispatcher whose queue is always closed
#[derive(Debug, Default)]
pub struct ClosedDispatcher;

impl Dispatcher for ClosedDispatcher {
    fn dispatch(&self, _job: PipelineJob) -> Result<(), DispatchError> {
        Err(DispatchError::Closed)
    }
}

/// Store that is never reachable
#[derive(Debug, Default)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn error() -> StoreError {
        StoreError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl TaskStore for UnavailableStore {
    fn backend_name(&self) -> &str {
        "unavailable"
    }

    async fn insert(&self, _record: &TaskRecord) -> Result<(), StoreError> {
        Err(Self::error())
    }

    async fn get(&self, _id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        Err(Self::error())
    }

    async fn advance(
        &self,
        _id: Uuid,
        _change: StatusChange,
    ) -> Result<StoreTransition, StoreError> {
        Err(Self::error())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(Self::error())
    }
}

/// In-memory store whose writes toward chosen statuses fail
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryTaskStore,
    failing: HashSet<TaskStatus>,
}

impl FaultyStore {
    pub fn failing_on(statuses: &[TaskStatus]) -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            failing: statuses.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl TaskStore for FaultyStore {
    fn backend_name(&self) -> &str {
        "faulty"
    }

    async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn advance(&self, id: Uuid, change: StatusChange) -> Result<StoreTransition, StoreError> {
        if self.failing.contains(&change.target()) {
            return Err(StoreError::Unavailable(format!(
                "write to {} rejected",
                change.target()
            )));
        }
        self.inner.advance(id, change).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::task::TaskType;

    fn step(capability: &str, output: OutputShape) -> StepSpec {
        StepSpec::new("s", capability, "do", "out", output)
    }

    #[tokio::test]
    async fn test_scripted_capability_consumes_script_then_defaults() {
        let agents = ScriptedCapability::new().script(
            "researcher",
            vec![Err(CapabilityError::Transient("once".into()))],
        );
        let ctx = ExecutionContext::new(Uuid::new_v4(), TaskType::AnalyzeNiche, json!({}));
        let step = step("researcher", OutputShape::Text);

        assert!(agents.invoke(&step, &ctx).await.is_err());
        assert_eq!(
            agents.invoke(&step, &ctx).await.unwrap(),
            json!("mock output for s")
        );
        assert_eq!(agents.call_count("researcher"), 2);
    }

    #[tokio::test]
    async fn test_mock_llm_provider_scripted_errors() {
        let provider = MockLlmProvider::with_responses(vec![
            Err(LlmError::NetworkError("down".into())),
            Ok("fine".into()),
        ]);
        let request = CompletionRequest {
            messages: vec![Message::user("hi")],
            model: "m".into(),
            max_tokens: None,
            temperature: None,
            response_format: None,
            metadata: HashMap::new(),
        };

        assert!(provider.complete(request.clone()).await.is_err());
        let ok = provider.complete(request).await.unwrap();
        assert_eq!(ok.content.as_deref(), Some("fine"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_faulty_store_rejects_chosen_transition() {
        let store = FaultyStore::failing_on(&[TaskStatus::Processing]);
        let id = Uuid::new_v4();
        let result = store.advance(id, StatusChange::Processing).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
