//! Agent capabilities
//!
//! An agent capability turns a step's instructions plus the accumulated
//! context into output. The executor only sees [`AgentCapability`]; every
//! failure is classified so it can decide whether a retry makes sense.

pub mod llm_agents;
pub mod prompts;
pub mod ranking;

pub use llm_agents::{classify_llm_error, AgentRole, LlmAgents};
pub use ranking::{parse_ranked_list, RankedEntry, RankedList};

use crate::pipeline::{ExecutionContext, StepSpec};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Capability names used by the built-in pipelines
pub mod roles {
    pub const RESEARCHER: &str = "researcher";
    pub const VALIDATOR: &str = "validator";
}

/// Why a step invocation failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Missing credentials or an unusable backend; retrying cannot help
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Network, timeout, rate limit or server-side failure
    #[error("transient error: {0}")]
    Transient(String),
    /// The backend answered but the output is unusable
    #[error("invalid output: {0}")]
    Semantic(String),
}

impl CapabilityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Transient(_) => "transient",
            Self::Semantic(_) => "semantic",
        }
    }
}

#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Perform one step against the context built so far
    async fn invoke(&self, step: &StepSpec, ctx: &ExecutionContext)
        -> Result<Value, CapabilityError>;

    /// Whether invocations can possibly succeed
    fn is_configured(&self) -> bool {
        true
    }
}
