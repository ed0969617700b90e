//! LLM-backed agent capabilities
//!
//! One provider serves every role; a role only changes the persona in the
//! system prompt. When no provider could be built (usually a missing API
//! key) the agents still exist but every invocation fails with a
//! configuration error, so tasks end FAILED with a readable reason.

use super::prompts::build_messages;
use super::ranking::{parse_ranked_list, RankedList};
use super::{roles, AgentCapability, CapabilityError};
use crate::config::ServiceConfig;
use crate::llm::{
    create_provider, CompletionRequest, JsonSchemaDefinition, LlmError, LlmProvider,
    ResponseFormat,
};
use crate::pipeline::{ExecutionContext, OutputShape, StepSpec};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Persona an LLM plays for one capability
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRole {
    pub title: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentRole {
    pub fn new(
        title: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            goal: goal.into(),
            backstory: backstory.into(),
        }
    }
}

/// Personas for the built-in capabilities
pub fn default_roles() -> HashMap<String, AgentRole> {
    HashMap::from([
        (
            roles::RESEARCHER.to_string(),
            AgentRole::new(
                "experienced digital market analyst",
                "Analyse potential market niches that combine the user's passions and \
                 skills, covering trends, potential market size and initial competition.",
                "You are meticulous and have long experience spotting opportunities in \
                 digital markets, specialising in information products such as courses, \
                 e-books and mentoring. You know how to match passions and skills with \
                 real market demand.",
            ),
        ),
        (
            roles::VALIDATOR.to_string(),
            AgentRole::new(
                "demand and revenue potential validator",
                "Assess monetization potential and market demand for the niches the \
                 researcher identified, for beginner digital entrepreneurs, and score \
                 their viability.",
                "You have a critical eye for digital businesses and understand what \
                 sells online, especially for people just starting out. You can tell \
                 whether a niche has money on the table and whether the competition is \
                 manageable for a beginner.",
            ),
        ),
    ])
}

/// Map a provider failure onto the retry taxonomy
pub fn classify_llm_error(error: LlmError) -> CapabilityError {
    match error {
        LlmError::NotConfigured(_)
        | LlmError::AuthenticationFailed(_)
        | LlmError::ModelNotFound(_)
        | LlmError::InvalidRequest(_) => CapabilityError::Configuration(error.to_string()),
        LlmError::NetworkError(_)
        | LlmError::RateLimitExceeded(_)
        | LlmError::ServiceUnavailable(_)
        | LlmError::RequestFailed(_) => CapabilityError::Transient(error.to_string()),
        LlmError::InvalidResponse(_) | LlmError::ApiError(_) => {
            CapabilityError::Semantic(error.to_string())
        }
    }
}

pub struct LlmAgents {
    backend: Option<Arc<dyn LlmProvider>>,
    unconfigured_reason: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    roles: HashMap<String, AgentRole>,
}

impl LlmAgents {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            backend: Some(provider),
            unconfigured_reason: String::new(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            roles: default_roles(),
        }
    }

    /// Agents that fail every invocation with a configuration error
    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self {
            backend: None,
            unconfigured_reason: reason.into(),
            model: String::new(),
            temperature: None,
            max_tokens: None,
            roles: default_roles(),
        }
    }

    /// Build from service config, degrading to unconfigured agents on error
    pub fn from_config(config: &ServiceConfig) -> Self {
        let api_key = match config.get_llm_api_key() {
            Ok(key) => key,
            Err(e) => {
                warn!("LLM backend not configured, tasks will fail: {}", e);
                return Self::unconfigured(e.to_string());
            }
        };

        match create_provider(&config.llm, api_key) {
            Ok(provider) => Self::new(provider, config.llm.model.clone())
                .with_sampling(config.llm.temperature, config.llm.max_tokens),
            Err(e) => {
                warn!("LLM provider could not be created, tasks will fail: {}", e);
                Self::unconfigured(e.to_string())
            }
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_role(mut self, capability: impl Into<String>, role: AgentRole) -> Self {
        self.roles.insert(capability.into(), role);
        self
    }

    pub fn provider(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.backend.as_ref()
    }

    fn response_format(step: &StepSpec) -> Option<ResponseFormat> {
        match step.output {
            OutputShape::Text => None,
            OutputShape::RankedList => match RankedList::json_schema() {
                Ok(schema) => Some(ResponseFormat::JsonSchema {
                    json_schema: JsonSchemaDefinition {
                        name: "ranked_list".to_string(),
                        strict: None,
                        schema,
                    },
                }),
                Err(_) => Some(ResponseFormat::Json),
            },
        }
    }

    fn shape_output(step: &StepSpec, content: &str) -> Result<Value, CapabilityError> {
        match step.output {
            OutputShape::Text => {
                let text = content.trim();
                if text.is_empty() {
                    return Err(CapabilityError::Semantic(format!(
                        "step '{}' produced empty output",
                        step.name
                    )));
                }
                Ok(Value::String(text.to_string()))
            }
            OutputShape::RankedList => {
                let list = parse_ranked_list(content)?;
                serde_json::to_value(list.entries)
                    .map_err(|e| CapabilityError::Semantic(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl AgentCapability for LlmAgents {
    async fn invoke(
        &self,
        step: &StepSpec,
        ctx: &ExecutionContext,
    ) -> Result<Value, CapabilityError> {
        let Some(provider) = &self.backend else {
            return Err(CapabilityError::Configuration(format!(
                "LLM backend unavailable: {}",
                self.unconfigured_reason
            )));
        };

        let role = self.roles.get(&step.agent_capability).ok_or_else(|| {
            CapabilityError::Configuration(format!(
                "no agent provides capability '{}'",
                step.agent_capability
            ))
        })?;

        let request = CompletionRequest {
            messages: build_messages(role, step, ctx),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: Self::response_format(step),
            metadata: HashMap::from([
                ("task_id".to_string(), ctx.task_id().to_string()),
                ("step".to_string(), step.name.clone()),
            ]),
        };

        let response = provider.complete(request).await.map_err(classify_llm_error)?;
        debug!(
            provider = provider.name(),
            total_tokens = response.usage.total_tokens,
            "Agent completion received"
        );

        let content = response.content.unwrap_or_default();
        Self::shape_output(step, &content)
    }

    fn is_configured(&self) -> bool {
        self.backend.is_some()
    }
}
