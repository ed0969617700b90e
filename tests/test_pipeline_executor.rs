//! Pipeline executor behavior: step ordering, retries, failure recording
//! and duplicate delivery

mod test_helpers;

use crewline::agents::{roles, CapabilityError, LlmAgents};
use crewline::llm::LlmError;
use crewline::pipeline::RunOutcome;
use crewline::task::TaskStatus;
use crewline::testing::{FaultyStore, MockLlmProvider, ScriptedCapability};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{assert_status, Harness};

#[tokio::test]
async fn test_niche_pipeline_runs_steps_in_order_with_accumulated_context() {
    let agents = Arc::new(ScriptedCapability::new());
    let harness = Harness::new(agents.clone());

    let record = harness.submit_niche().await;
    let outcome = harness.executor.run(harness.last_job()).await;

    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let calls = agents.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].step, "research_niches");
    assert!(calls[0].prior_steps.is_empty());
    assert_eq!(calls[1].step, "validate_niches");
    assert_eq!(calls[1].prior_steps, vec!["research_niches".to_string()]);

    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Completed);
    assert!(stored.error_message.is_none());
    assert_eq!(stored.result.unwrap()[0]["name"], "mock niche");
}

#[tokio::test]
async fn test_second_step_configuration_error_fails_task_naming_step() {
    let agents = Arc::new(ScriptedCapability::new().script(
        roles::VALIDATOR,
        vec![Err(CapabilityError::Configuration(
            "LLM backend not configured".to_string(),
        ))],
    ));
    let harness = Harness::new(agents.clone());

    let record = harness.submit_niche().await;
    let outcome = harness.executor.run(harness.last_job()).await;

    let RunOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("validate_niches"));

    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Failed);
    assert!(stored.result.is_none());
    assert!(stored
        .error_message
        .as_deref()
        .unwrap()
        .contains("validate_niches"));
    // Configuration errors are not retried
    assert_eq!(agents.call_count(roles::VALIDATOR), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let agents = Arc::new(ScriptedCapability::new().script(
        roles::RESEARCHER,
        vec![
            Err(CapabilityError::Transient("timeout".to_string())),
            Err(CapabilityError::Transient("rate limited".to_string())),
            Ok(json!("five promising niches")),
        ],
    ));
    let harness = Harness::new(agents.clone());

    let record = harness.submit_niche().await;
    let outcome = harness.executor.run(harness.last_job()).await;

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(agents.call_count(roles::RESEARCHER), 3);
    assert_eq!(agents.call_count(roles::VALIDATOR), 1);
    assert_status(&harness.record(record.id).await, TaskStatus::Completed);
}

#[tokio::test]
async fn test_transient_failures_exhaust_retry_budget() {
    let transient = || Err(CapabilityError::Transient("service unavailable".to_string()));
    let agents = Arc::new(
        ScriptedCapability::new()
            .script(roles::RESEARCHER, vec![transient(), transient(), transient()]),
    );
    let harness = Harness::new(agents.clone());

    let record = harness.submit_niche().await;
    harness.executor.run(harness.last_job()).await;

    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Failed);
    let message = stored.error_message.unwrap();
    assert!(message.contains("research_niches"));
    assert!(message.contains("3 attempt(s)"));
    assert_eq!(agents.call_count(roles::RESEARCHER), 3);
    assert_eq!(agents.call_count(roles::VALIDATOR), 0);
}

#[tokio::test]
async fn test_semantic_failure_is_not_retried() {
    let agents = Arc::new(ScriptedCapability::new().script(
        roles::VALIDATOR,
        vec![Err(CapabilityError::Semantic(
            "output is not a ranked list".to_string(),
        ))],
    ));
    let harness = Harness::new(agents.clone());

    let record = harness.submit_niche().await;
    harness.executor.run(harness.last_job()).await;

    assert_eq!(agents.call_count(roles::VALIDATOR), 1);
    assert_status(&harness.record(record.id).await, TaskStatus::Failed);
}

#[tokio::test]
async fn test_duplicate_delivery_is_skipped() {
    let agents = Arc::new(ScriptedCapability::new());
    let harness = Harness::new(agents.clone());

    let record = harness.submit_niche().await;
    let job = harness.last_job();

    let first = harness.executor.run(job.clone()).await;
    let second = harness.executor.run(job).await;

    assert!(matches!(first, RunOutcome::Completed(_)));
    assert_eq!(second, RunOutcome::Skipped(TaskStatus::Completed));
    assert_eq!(agents.call_count(roles::RESEARCHER), 1);

    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Completed);
    assert!(stored.result.is_some());
}

#[tokio::test]
async fn test_processing_write_failure_aborts_before_any_agent_call() {
    let agents = Arc::new(ScriptedCapability::new());
    let store = Arc::new(FaultyStore::failing_on(&[TaskStatus::Processing]));
    let harness = Harness::with_store(store, agents.clone());

    let record = harness.submit_niche().await;
    let outcome = harness.executor.run(harness.last_job()).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(agents.calls().is_empty());
    assert_status(&harness.record(record.id).await, TaskStatus::Failed);
}

#[tokio::test]
async fn test_processing_and_failure_writes_failing_leaves_record_pending() {
    let agents = Arc::new(ScriptedCapability::new());
    let store = Arc::new(FaultyStore::failing_on(&[
        TaskStatus::Processing,
        TaskStatus::Failed,
    ]));
    let harness = Harness::with_store(store, agents.clone());

    let record = harness.submit_niche().await;
    let outcome = harness.executor.run(harness.last_job()).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(agents.calls().is_empty());
    assert_status(&harness.record(record.id).await, TaskStatus::Pending);
}

#[tokio::test]
async fn test_completion_write_failure_records_task_as_failed() {
    let agents = Arc::new(ScriptedCapability::new());
    let store = Arc::new(FaultyStore::failing_on(&[TaskStatus::Completed]));
    let harness = Harness::with_store(store, agents.clone());

    let record = harness.submit_niche().await;
    let outcome = harness.executor.run(harness.last_job()).await;

    let RunOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("could not record completion"));
    assert_eq!(agents.calls().len(), 2);

    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Failed);
    assert!(stored.result.is_none());
}

#[tokio::test]
async fn test_run_finishing_after_task_was_failed_reports_stored_outcome() {
    let agents = Arc::new(ScriptedCapability::new().with_delay(Duration::from_millis(100)));
    let harness = Harness::new(agents);

    let record = harness.submit_niche().await;
    let job = harness.last_job();

    let (outcome, _) = tokio::join!(harness.executor.run(job), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        harness
            .orchestrator
            .mark_failed(record.id, "cancelled by operator")
            .await
            .unwrap();
    });

    assert_eq!(
        outcome,
        RunOutcome::Failed("cancelled by operator".to_string())
    );
    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Failed);
    assert!(stored.result.is_none());
}

#[tokio::test]
async fn test_unconfigured_backend_fails_task_with_configuration_error() {
    let agents = Arc::new(LlmAgents::unconfigured(
        "Environment variable not found: OPENAI_API_KEY",
    ));
    let harness = Harness::new(agents);

    let record = harness.submit_niche().await;
    harness.executor.run(harness.last_job()).await;

    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Failed);
    assert!(stored
        .error_message
        .unwrap()
        .contains("research_niches"));
}

#[tokio::test]
async fn test_llm_agents_produce_ranked_result_sorted_by_score() {
    let ranked = json!([
        {"name": "Budget travel cooking", "score": 64, "justification": "Moderate demand"},
        {"name": "Travel video editing course", "score": 88, "justification": "Clear buyer intent"}
    ]);
    let provider = Arc::new(MockLlmProvider::with_responses(vec![
        Ok("1. Budget travel cooking\n2. Travel video editing course".to_string()),
        Ok(format!("```json\n{ranked}\n```")),
    ]));
    let agents = Arc::new(LlmAgents::new(provider.clone(), "mock-model"));
    let harness = Harness::new(agents);

    let record = harness.submit_niche().await;
    harness.executor.run(harness.last_job()).await;

    let stored = harness.record(record.id).await;
    assert_status(&stored, TaskStatus::Completed);
    let result = stored.result.unwrap();
    assert_eq!(result[0]["name"], "Travel video editing course");
    assert_eq!(result[0]["score"], 88);
    assert_eq!(result[1]["score"], 64);

    // The validator saw the researcher's output
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let validator_prompt = &requests[1].messages.last().unwrap().content;
    assert!(validator_prompt.contains("Budget travel cooking"));
}

#[tokio::test]
async fn test_llm_rate_limit_is_retried_through_llm_agents() {
    let provider = Arc::new(MockLlmProvider::with_responses(vec![
        Err(LlmError::RateLimitExceeded("slow down".to_string())),
        Ok("1. Budget travel cooking".to_string()),
        Ok(r#"[{"name": "Budget travel cooking", "score": 70, "justification": "ok"}]"#
            .to_string()),
    ]));
    let agents = Arc::new(LlmAgents::new(provider.clone(), "mock-model"));
    let harness = Harness::new(agents);

    let record = harness.submit_niche().await;
    harness.executor.run(harness.last_job()).await;

    assert_eq!(provider.call_count(), 3);
    assert_status(&harness.record(record.id).await, TaskStatus::Completed);
}

#[tokio::test]
async fn test_llm_authentication_failure_is_not_retried() {
    let provider = Arc::new(MockLlmProvider::with_responses(vec![Err(
        LlmError::AuthenticationFailed("bad key".to_string()),
    )]));
    let agents = Arc::new(LlmAgents::new(provider.clone(), "mock-model"));
    let harness = Harness::new(agents);

    let record = harness.submit_niche().await;
    harness.executor.run(harness.last_job()).await;

    assert_eq!(provider.call_count(), 1);
    assert_status(&harness.record(record.id).await, TaskStatus::Failed);
}
