//! Integration tests for the OpenAI provider against a mock HTTP server
//!
//! Covers request shape, response parsing and the classification of
//! error statuses that decides whether a pipeline step is retried.

use crewline::agents::{classify_llm_error, CapabilityError};
use crewline::llm::provider::{
    CompletionRequest, FinishReason, JsonSchemaDefinition, LlmError, LlmProvider, Message,
    ResponseFormat,
};
use crewline::llm::providers::openai::{OpenAiConfig, OpenAiProvider};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn test_request(model: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            Message::system("You are a market researcher."),
            Message::user("List niches for cooking and travel"),
        ],
        model: model.to_string(),
        max_tokens: Some(100),
        temperature: Some(0.7),
        response_format: None,
        metadata: HashMap::new(),
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }
        ],
        "usage": {"prompt_tokens": 10, "completion_tokens": 15, "total_tokens": 25}
    })
}

async fn provider_for(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(test_config(&server.uri())).unwrap()
}

#[tokio::test]
async fn test_openai_provider_returns_successful_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 100,
            "messages": [
                {"role": "system", "content": "You are a market researcher."},
                {"role": "user", "content": "List niches for cooking and travel"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("1. Travel vlogs")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server).await;
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("1. Travel vlogs"));
    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(response.usage.total_tokens, 25);
    assert_eq!(response.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn test_openai_provider_sends_json_schema_response_format() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "ranked_list"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("[]")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut request = test_request("gpt-4o-mini");
    request.response_format = Some(ResponseFormat::JsonSchema {
        json_schema: JsonSchemaDefinition {
            name: "ranked_list".to_string(),
            strict: None,
            schema: json!({"type": "object"}),
        },
    });

    let provider = provider_for(&mock_server).await;
    provider.complete(request).await.unwrap();
}

#[tokio::test]
async fn test_openai_error_statuses_are_classified() {
    let cases = [
        (401, "auth"),
        (403, "auth"),
        (404, "model"),
        (429, "rate"),
        (500, "unavailable"),
        (503, "unavailable"),
        (400, "api"),
    ];

    for (status, expected) in cases {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"error": {"message": "nope"}})),
            )
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server).await;
        let err = provider
            .complete(test_request("gpt-4o-mini"))
            .await
            .unwrap_err();

        let matched = match expected {
            "auth" => matches!(err, LlmError::AuthenticationFailed(_)),
            "model" => matches!(err, LlmError::ModelNotFound(_)),
            "rate" => matches!(err, LlmError::RateLimitExceeded(_)),
            "unavailable" => matches!(err, LlmError::ServiceUnavailable(_)),
            _ => matches!(err, LlmError::ApiError(_)),
        };
        assert!(matched, "status {status} classified as {err:?}");
    }
}

#[tokio::test]
async fn test_openai_retryable_statuses_map_to_transient_step_errors() {
    for (status, retryable) in [(429, true), (502, true), (401, false), (404, false)] {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server).await;
        let err = provider
            .complete(test_request("gpt-4o-mini"))
            .await
            .unwrap_err();
        let step_error: CapabilityError = classify_llm_error(err);
        assert_eq!(step_error.is_retryable(), retryable, "status {status}");
    }
}

#[tokio::test]
async fn test_openai_empty_choices_is_invalid_response() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "model": "gpt-4o-mini",
            "choices": [],
            "usage": {"prompt_tokens": 1, "completion_tokens": 0, "total_tokens": 1}
        })))
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server).await;
    let err = provider
        .complete(test_request("gpt-4o-mini"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_openai_malformed_body_is_invalid_response() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server).await;
    let err = provider
        .complete(test_request("gpt-4o-mini"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_openai_unreachable_server_is_network_error() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();
    drop(mock_server);

    let provider = OpenAiProvider::new(test_config(&uri)).unwrap();
    let err = provider
        .complete(test_request("gpt-4o-mini"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::NetworkError(_)));
}

#[tokio::test]
async fn test_openai_health_check_lists_models() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server).await;
    provider.health_check().await.unwrap();
}

#[test]
fn test_openai_provider_requires_api_key() {
    let result = OpenAiProvider::new(OpenAiConfig::default());
    assert!(matches!(result, Err(LlmError::NotConfigured(_))));
}
